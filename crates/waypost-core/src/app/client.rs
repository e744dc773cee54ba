//! SubmissionClient - 送信してみて、失敗したらローカルに積む
//!
//! # フロー
//! 1. 座標を検証（不正なら I/O なしで ValidationError）
//! 2. payload を組み立て（時刻・端末情報・submission_id）
//! 3. タイムアウト付きで直接配送
//! 4. 成功 → Delivered（ストアには触らない）
//! 5. 失敗 → ストアに append してから Queued（理由付き）
//! 6. append 自体の失敗は StorageError として呼び出し元へ

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use ulid::Ulid;

use super::deadline::with_deadline;
use crate::domain::{Coordinates, Metadata, Submission, SubmitError, SubmitOutcome};
use crate::ports::{Clock, DurableQueue, SubmissionTransport};

/// Default bound on one direct delivery attempt.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(15);

/// Originating device identifiers, copied into every submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub platform: String,
    pub agent: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            platform: std::env::consts::OS.to_string(),
            agent: format!("waypost/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

pub struct SubmissionClient {
    store: Arc<dyn DurableQueue<Submission>>,
    transport: Arc<dyn SubmissionTransport>,
    clock: Arc<dyn Clock>,
    device: DeviceInfo,
    timeout: Duration,
    /// Last timestamp handed out; keeps metadata timestamps non-decreasing
    /// even if the wall clock steps back.
    last_timestamp: Mutex<Option<DateTime<Utc>>>,
}

impl SubmissionClient {
    pub fn new(
        store: Arc<dyn DurableQueue<Submission>>,
        transport: Arc<dyn SubmissionTransport>,
        clock: Arc<dyn Clock>,
        device: DeviceInfo,
    ) -> Self {
        Self {
            store,
            transport,
            clock,
            device,
            timeout: DEFAULT_DELIVERY_TIMEOUT,
            last_timestamp: Mutex::new(None),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn submit(&self, lat: f64, lng: f64) -> Result<SubmitOutcome, SubmitError> {
        self.submit_with_timeout(lat, lng, self.timeout).await
    }

    pub async fn submit_with_timeout(
        &self,
        lat: f64,
        lng: f64,
        timeout: Duration,
    ) -> Result<SubmitOutcome, SubmitError> {
        let location = Coordinates::new(lat, lng)?;
        let submission = self.build(location);
        let submission_id = submission.metadata.submission_id;

        let reason = match with_deadline(timeout, self.transport.deliver(&submission)).await {
            Ok(receipt) => {
                info!(
                    submission_id = %submission_id,
                    location_id = receipt.location_id.as_deref().unwrap_or("-"),
                    "Submission delivered"
                );
                return Ok(SubmitOutcome::Delivered(receipt));
            }
            Err(reason) => reason,
        };

        let key = self.store.append(submission).await.map_err(|e| {
            error!(submission_id = %submission_id, error = %e, "Failed to persist submission");
            e
        })?;

        warn!(
            submission_id = %submission_id,
            key = %key,
            reason = %reason,
            "Direct delivery failed; submission queued"
        );
        Ok(SubmitOutcome::Queued { key, reason })
    }

    fn build(&self, location: Coordinates) -> Submission {
        let timestamp = self.next_timestamp();
        let timestamp_ms = u64::try_from(timestamp.timestamp_millis()).unwrap_or_default();
        Submission {
            location,
            metadata: Metadata {
                submission_id: Ulid::from_parts(timestamp_ms, rand::random()),
                timestamp,
                device: self.device.platform.clone(),
                os: self.device.agent.clone(),
            },
        }
    }

    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        let mut last = self.last_timestamp.lock().unwrap_or_else(|e| e.into_inner());
        let ts = match *last {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        *last = Some(ts);
        ts
    }
}
