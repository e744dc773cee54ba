//! ScriptedTransport - テスト用の配送先
//!
//! Answers from a script of per-call results, falling back to a
//! reachable/unreachable switch once the script is exhausted. Every attempt
//! and every accepted payload is recorded for assertions.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::domain::{CapturedRequest, DeliveryError, InterceptedResponse, Receipt, Submission};
use crate::ports::{RequestTransport, SubmissionTransport};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct ScriptedTransport {
    reachable: AtomicBool,
    script: Mutex<VecDeque<Result<(), DeliveryError>>>,
    attempts: AtomicUsize,
    delivered: Mutex<Vec<Submission>>,
    forwarded: Mutex<Vec<CapturedRequest>>,
    response_status: Mutex<u16>,
}

impl ScriptedTransport {
    pub fn reachable() -> Self {
        Self::with_reachability(true)
    }

    pub fn unreachable() -> Self {
        Self::with_reachability(false)
    }

    fn with_reachability(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
            script: Mutex::new(VecDeque::new()),
            attempts: AtomicUsize::new(0),
            delivered: Mutex::new(Vec::new()),
            forwarded: Mutex::new(Vec::new()),
            response_status: Mutex::new(201),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Queue explicit results for the next calls, in order.
    pub fn script(&self, results: impl IntoIterator<Item = Result<(), DeliveryError>>) {
        lock(&self.script).extend(results);
    }

    /// HTTP status returned for forwarded requests.
    pub fn set_response_status(&self, status: u16) {
        *lock(&self.response_status) = status;
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<Submission> {
        lock(&self.delivered).clone()
    }

    pub fn forwarded(&self) -> Vec<CapturedRequest> {
        lock(&self.forwarded).clone()
    }

    fn next_result(&self) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = lock(&self.script).pop_front() {
            return result;
        }
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DeliveryError::Network("endpoint unreachable".to_string()))
        }
    }
}

#[async_trait]
impl SubmissionTransport for ScriptedTransport {
    async fn deliver(&self, submission: &Submission) -> Result<Receipt, DeliveryError> {
        self.next_result()?;
        let mut delivered = lock(&self.delivered);
        delivered.push(submission.clone());
        Ok(Receipt {
            location_id: Some(format!("loc-{}", delivered.len())),
            accepted_at: None,
        })
    }
}

#[async_trait]
impl RequestTransport for ScriptedTransport {
    async fn send(&self, request: &CapturedRequest) -> Result<InterceptedResponse, DeliveryError> {
        self.next_result()?;
        lock(&self.forwarded).push(request.clone());
        Ok(InterceptedResponse {
            status: *lock(&self.response_status),
            headers: Vec::new(),
            body: br#"{"success":true}"#.to_vec(),
        })
    }
}
