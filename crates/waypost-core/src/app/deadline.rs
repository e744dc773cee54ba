//! Bounded delivery attempts.

use std::future::Future;
use std::time::Duration;

use crate::domain::DeliveryError;

/// Run one delivery attempt, failing with `DeliveryError::Timeout` once
/// `timeout` elapses. The timer is dropped with the returned future, whatever
/// the exit path.
pub async fn with_deadline<T, F>(timeout: Duration, attempt: F) -> Result<T, DeliveryError>
where
    F: Future<Output = Result<T, DeliveryError>>,
{
    match tokio::time::timeout(timeout, attempt).await {
        Ok(result) => result,
        Err(_elapsed) => Err(DeliveryError::Timeout(timeout)),
    }
}
