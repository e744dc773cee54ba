//! Outcome model: what a caller learns from `submit`, `drain` and `replay`.
//!
//! A caller can always tell three things apart: confirmed delivered,
//! queued for later delivery, and failed outright (an `Err`).

use serde::{Deserialize, Serialize};

use super::errors::DeliveryError;
use super::ids::{Key, QueuePayload};
use super::{CapturedRequest, Submission, SubmissionKey};

/// Parsed acceptance body. Both fields are optional because the legacy
/// endpoint and the current one name them differently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<String>,
}

/// Serialized as SCREAMING_SNAKE_CASE: DELIVERED / QUEUED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Delivered,
    Queued,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The endpoint confirmed acceptance; nothing was stored locally.
    Delivered(Receipt),

    /// Direct delivery failed; the submission is persisted under `key` and
    /// will be replayed by the drainer.
    Queued {
        key: SubmissionKey,
        reason: DeliveryError,
    },
}

impl SubmitOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            SubmitOutcome::Delivered(_) => OutcomeKind::Delivered,
            SubmitOutcome::Queued { .. } => OutcomeKind::Queued,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, SubmitOutcome::Delivered(_))
    }
}

/// Result of one full walk over a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport<P: QueuePayload> {
    pub delivered: usize,
    pub remaining: usize,
    /// Entry whose delivery failed and stopped the pass.
    pub halted_at: Option<Key<P>>,
}

impl<P: QueuePayload> PassReport<P> {
    pub fn is_clean(&self) -> bool {
        self.halted_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pass<P: QueuePayload> {
    Completed(PassReport<P>),
    /// Another pass was already running; this trigger did nothing.
    Coalesced,
}

impl<P: QueuePayload> Pass<P> {
    pub fn report(&self) -> Option<&PassReport<P>> {
        match self {
            Pass::Completed(report) => Some(report),
            Pass::Coalesced => None,
        }
    }
}

/// One drain pass over the submission store.
pub type DrainPass = Pass<Submission>;

/// One replay pass over the intercepted-request queue.
pub type ReplayPass = Pass<CapturedRequest>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_kind_serializes_as_screaming_snake_case() {
        let s = serde_json::to_string(&OutcomeKind::Delivered).unwrap();
        assert_eq!(s, "\"DELIVERED\"");
        let s = serde_json::to_string(&OutcomeKind::Queued).unwrap();
        assert_eq!(s, "\"QUEUED\"");
    }

    #[test]
    fn queued_outcome_keeps_the_failure_reason() {
        let outcome = SubmitOutcome::Queued {
            key: SubmissionKey::new(1),
            reason: DeliveryError::Network("offline".into()),
        };
        assert_eq!(outcome.kind(), OutcomeKind::Queued);
        assert!(!outcome.is_delivered());
        match outcome {
            SubmitOutcome::Queued { reason, .. } => {
                assert_eq!(reason, DeliveryError::Network("offline".into()))
            }
            SubmitOutcome::Delivered(_) => panic!("expected queued"),
        }
    }

    #[test]
    fn coalesced_pass_has_no_report() {
        let pass: DrainPass = Pass::Coalesced;
        assert!(pass.report().is_none());

        let pass: DrainPass = Pass::Completed(PassReport {
            delivered: 2,
            remaining: 0,
            halted_at: None,
        });
        assert!(pass.report().unwrap().is_clean());
    }
}
