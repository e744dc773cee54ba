//! Transport ports - リモート受付エンドポイントへの配送
//!
//! Two seams, one per safety net:
//! - `SubmissionTransport`: the submission client and drainer deliver parsed
//!   `Submission`s and need a confirmed `Receipt`.
//! - `RequestTransport`: the interception layer forwards opaque requests and
//!   only cares whether the server answered.

use async_trait::async_trait;

use crate::domain::{CapturedRequest, DeliveryError, InterceptedResponse, Receipt, Submission};

#[async_trait]
pub trait SubmissionTransport: Send + Sync {
    /// One delivery attempt. `Ok` means the endpoint confirmed acceptance;
    /// every other result (network error, non-2xx, `success: false`) is an `Err`.
    async fn deliver(&self, submission: &Submission) -> Result<Receipt, DeliveryError>;
}

#[async_trait]
pub trait RequestTransport: Send + Sync {
    /// Send the request as-is. `Err` only when no response was obtained
    /// (connection failure, timeout); any HTTP status is an `Ok` response.
    async fn send(&self, request: &CapturedRequest) -> Result<InterceptedResponse, DeliveryError>;
}
