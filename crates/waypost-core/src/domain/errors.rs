//! Errors - エラー型と分類
//!
//! # 分類
//! - ValidationError: 座標が不正（I/O の前に弾く）
//! - DeliveryError: 配送失敗（ネットワーク / タイムアウト / 非 2xx）。キューに積めば回復可能
//! - StorageError: ローカル永続化の失敗。致命的で、黙ってリトライしない
//!
//! `DeliveryError` is absorbed into a "queued" outcome only after the enqueue
//! succeeded. `ValidationError` and `StorageError` always reach the caller.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use super::RequestKey;

/// Which coordinate a validation error is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinateField {
    Latitude,
    Longitude,
}

impl CoordinateField {
    pub fn as_str(self) -> &'static str {
        match self {
            CoordinateField::Latitude => "lat",
            CoordinateField::Longitude => "lng",
        }
    }
}

impl fmt::Display for CoordinateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} must be a finite number")]
    NonFinite { field: CoordinateField },

    #[error("{field}={value} is outside [{min}, {max}]")]
    OutOfRange {
        field: CoordinateField,
        value: f64,
        min: f64,
        max: f64,
    },
}

impl ValidationError {
    pub fn field(&self) -> CoordinateField {
        match self {
            ValidationError::NonFinite { field } | ValidationError::OutOfRange { field, .. } => {
                *field
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("network error: {0}")]
    Network(String),

    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("endpoint rejected the request: HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("endpoint did not confirm acceptance: {0}")]
    NotAccepted(String),

    #[error("unreadable acceptance response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("storage backend failure: {0}")]
    Backend(String),

    #[error("queue entry could not be (de)serialized: {0}")]
    Serialization(String),

    #[error("queue is full ({capacity} entries)")]
    CapacityExceeded { capacity: usize },

    #[error("invalid queue name {0:?}")]
    InvalidQueueName(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Failure of `SubmissionClient::submit` (delivered / queued are both `Ok`).
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid coordinates: {0}")]
    Validation(#[from] ValidationError),

    #[error("could not persist submission: {0}")]
    Storage(#[from] StorageError),
}

/// Failure of `InterceptionLayer::fetch` as seen by the caller.
#[derive(Debug, Error)]
pub enum InterceptError {
    /// The request did not go through; it was captured for later replay.
    #[error("request queued as {key} for replay: {reason}")]
    Queued {
        key: RequestKey,
        reason: DeliveryError,
    },

    /// A request outside the intercepted route failed; nothing was captured.
    #[error("request failed: {0}")]
    PassThrough(DeliveryError),

    #[error("could not capture request: {0}")]
    Storage(#[from] StorageError),
}
