//! InterceptionLayer - ネットワーク層で失敗したリクエストを捕まえて後で再送する
//!
//! # 捕捉対象
//! - 設定された route（既定: `POST` + `/api/locations` 前方一致）に一致するリクエストのみ
//! - 応答が得られなかった場合のみ（接続失敗・タイムアウト）
//!
//! Any HTTP response, whatever its status, is handed back unchanged: the
//! server answered, so nothing is captured. Non-matching requests are
//! forwarded and never queued.
//!
//! # 再送
//! `replay` peeks the front entry, sends it, and removes it only after a
//! response. A failed entry therefore stays at the front and the pass aborts.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::client::DEFAULT_DELIVERY_TIMEOUT;
use super::deadline::with_deadline;
use super::gate::PassGate;
use crate::domain::{
    CapturedRequest, InterceptError, InterceptedResponse, Pass, PassReport, ReplayPass,
    StorageError,
};
use crate::ports::{DurableQueue, RequestTransport};

/// Which outgoing requests the layer captures on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptRoute {
    pub method: String,
    pub path_prefix: String,
}

impl Default for InterceptRoute {
    fn default() -> Self {
        Self {
            method: "POST".to_string(),
            path_prefix: "/api/locations".to_string(),
        }
    }
}

impl InterceptRoute {
    pub fn new(method: impl Into<String>, path_prefix: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path_prefix: path_prefix.into(),
        }
    }

    pub fn matches(&self, request: &CapturedRequest) -> bool {
        request.method.eq_ignore_ascii_case(&self.method)
            && request
                .path()
                .is_some_and(|path| path.starts_with(&self.path_prefix))
    }
}

pub struct InterceptionLayer {
    queue: Arc<dyn DurableQueue<CapturedRequest>>,
    transport: Arc<dyn RequestTransport>,
    route: InterceptRoute,
    timeout: Duration,
    gate: PassGate,
}

impl InterceptionLayer {
    pub fn new(
        queue: Arc<dyn DurableQueue<CapturedRequest>>,
        transport: Arc<dyn RequestTransport>,
        route: InterceptRoute,
    ) -> Self {
        Self {
            queue,
            transport,
            route,
            timeout: DEFAULT_DELIVERY_TIMEOUT,
            gate: PassGate::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn route(&self) -> &InterceptRoute {
        &self.route
    }

    pub fn is_replaying(&self) -> bool {
        self.gate.is_busy()
    }

    pub async fn pending(&self) -> Result<usize, StorageError> {
        self.queue.len().await
    }

    pub async fn fetch(
        &self,
        request: CapturedRequest,
    ) -> Result<InterceptedResponse, InterceptError> {
        let reason = match with_deadline(self.timeout, self.transport.send(&request)).await {
            Ok(response) => {
                if !response.is_success() {
                    debug!(
                        method = %request.method,
                        url = %request.url,
                        status = response.status,
                        "Server answered with non-2xx status; returned as-is"
                    );
                }
                return Ok(response);
            }
            Err(reason) => reason,
        };

        if !self.route.matches(&request) {
            debug!(method = %request.method, url = %request.url, reason = %reason, "Request failed outside intercepted route");
            return Err(InterceptError::PassThrough(reason));
        }

        let url = request.url.clone();
        let key = self.queue.append(request).await?;
        warn!(key = %key, url = %url, reason = %reason, "Request failed; captured for replay");
        Err(InterceptError::Queued { key, reason })
    }

    /// Replay captured requests in capture order. Only a `StorageError` is
    /// fatal; a failed send ends the pass with the entry still at the front.
    pub async fn replay(&self) -> Result<ReplayPass, StorageError> {
        let Some(_guard) = self.gate.try_enter() else {
            debug!("Replay pass already running; trigger coalesced");
            return Ok(Pass::Coalesced);
        };

        let mut delivered = 0;
        let mut halted_at = None;

        while let Some((key, request)) = self.queue.front().await? {
            match with_deadline(self.timeout, self.transport.send(&request)).await {
                Ok(response) => {
                    self.queue.remove(key).await?;
                    delivered += 1;
                    if response.is_success() {
                        debug!(key = %key, status = response.status, "Replayed request");
                    } else {
                        warn!(key = %key, status = response.status, "Replayed request answered with non-2xx status");
                    }
                }
                Err(reason) => {
                    warn!(key = %key, reason = %reason, "Replay failed; request kept at front");
                    halted_at = Some(key);
                    break;
                }
            }
        }

        let remaining = self.queue.len().await?;
        info!(delivered, remaining, halted = halted_at.is_some(), "Replay pass finished");

        Ok(Pass::Completed(PassReport {
            delivered,
            remaining,
            halted_at,
        }))
    }
}
