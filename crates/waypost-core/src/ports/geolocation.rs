//! GeolocationProvider port - 端末の現在位置
//!
//! The provider is whatever the host platform offers; the core only bounds
//! the call in time and validates the coordinates it gets back.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Default upper bound on a position fix.
pub const DEFAULT_POSITION_TIMEOUT: Duration = Duration::from_secs(15);

/// A raw fix, before validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
    /// Accuracy radius in meters, when the platform reports one.
    pub accuracy_m: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("position unavailable: {0}")]
    PositionUnavailable(String),

    #[error("no position fix within {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    async fn current_position(&self) -> Result<Position, PositionError>;
}

/// Ask `provider` for a fix, giving up after `timeout`.
pub async fn locate_with_timeout(
    provider: &dyn GeolocationProvider,
    timeout: Duration,
) -> Result<Position, PositionError> {
    match tokio::time::timeout(timeout, provider.current_position()).await {
        Ok(result) => result,
        Err(_elapsed) => Err(PositionError::Timeout(timeout)),
    }
}

/// Provider returning a fixed position (CLI input, tests).
#[derive(Debug, Clone, Copy)]
pub struct FixedPosition(pub Position);

impl FixedPosition {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self(Position {
            lat,
            lng,
            accuracy_m: None,
        })
    }
}

#[async_trait]
impl GeolocationProvider for FixedPosition {
    async fn current_position(&self) -> Result<Position, PositionError> {
        Ok(self.0)
    }
}
