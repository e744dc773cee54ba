//! ReplayDrainer - 接続回復時にストアを古い順に再送する
//!
//! # 順序保証
//! 失敗したエントリで pass を止める（skip して先へ進まない）。
//! One pass never delivers an entry before an older one that failed; the next
//! pass starts again from the oldest remaining entry.
//!
//! Passes are not reentrant: a trigger arriving while a pass runs is coalesced.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::client::DEFAULT_DELIVERY_TIMEOUT;
use super::deadline::with_deadline;
use super::gate::PassGate;
use crate::domain::{DrainPass, Pass, PassReport, StorageError, Submission};
use crate::ports::{DurableQueue, SubmissionTransport, iterate};

pub struct ReplayDrainer {
    store: Arc<dyn DurableQueue<Submission>>,
    transport: Arc<dyn SubmissionTransport>,
    timeout: Duration,
    gate: PassGate,
}

impl ReplayDrainer {
    pub fn new(
        store: Arc<dyn DurableQueue<Submission>>,
        transport: Arc<dyn SubmissionTransport>,
    ) -> Self {
        Self {
            store,
            transport,
            timeout: DEFAULT_DELIVERY_TIMEOUT,
            gate: PassGate::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_draining(&self) -> bool {
        self.gate.is_busy()
    }

    /// Run one drain pass. Only a `StorageError` is fatal; delivery failures
    /// end the pass and are reported through `PassReport::halted_at`.
    pub async fn drain(&self) -> Result<DrainPass, StorageError> {
        let Some(_guard) = self.gate.try_enter() else {
            debug!("Drain pass already running; trigger coalesced");
            return Ok(Pass::Coalesced);
        };

        let mut cursor = iterate(&*self.store);
        let mut delivered = 0;
        let mut halted_at = None;

        while let Some((key, submission)) = cursor.next().await? {
            match with_deadline(self.timeout, self.transport.deliver(&submission)).await {
                Ok(receipt) => {
                    self.store.remove(key).await?;
                    delivered += 1;
                    debug!(
                        key = %key,
                        location_id = receipt.location_id.as_deref().unwrap_or("-"),
                        "Replayed submission"
                    );
                }
                Err(reason) => {
                    warn!(key = %key, reason = %reason, "Replay failed; stopping drain pass");
                    halted_at = Some(key);
                    break;
                }
            }
        }

        let remaining = self.store.len().await?;
        info!(delivered, remaining, halted = halted_at.is_some(), "Drain pass finished");

        Ok(Pass::Completed(PassReport {
            delivered,
            remaining,
            halted_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Coordinates, DeliveryError, Metadata, Receipt, SubmissionKey};
    use crate::impls::{InMemoryQueue, ScriptedTransport};
    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::Notify;
    use ulid::Ulid;

    fn submission(lat: f64) -> Submission {
        Submission {
            location: Coordinates::new(lat, 0.0).unwrap(),
            metadata: Metadata {
                submission_id: Ulid::new(),
                timestamp: Utc::now(),
                device: "test".into(),
                os: "test".into(),
            },
        }
    }

    async fn seeded(lats: &[f64]) -> (Arc<InMemoryQueue<Submission>>, Vec<SubmissionKey>) {
        let store = Arc::new(InMemoryQueue::new());
        let mut keys = Vec::new();
        for lat in lats {
            keys.push(store.append(submission(*lat)).await.unwrap());
        }
        (store, keys)
    }

    #[tokio::test]
    async fn drains_everything_when_endpoint_is_up() {
        let (store, _) = seeded(&[1.0, 2.0, 3.0]).await;
        let transport = Arc::new(ScriptedTransport::reachable());
        let drainer = ReplayDrainer::new(store.clone(), transport.clone());

        let pass = drainer.drain().await.unwrap();

        assert_eq!(
            pass,
            Pass::Completed(PassReport {
                delivered: 3,
                remaining: 0,
                halted_at: None
            })
        );
        let lats: Vec<f64> = transport.delivered().iter().map(|s| s.location.lat).collect();
        assert_eq!(lats, vec![1.0, 2.0, 3.0]);
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn stops_at_first_failure_and_keeps_later_entries() {
        let (store, keys) = seeded(&[1.0, 2.0, 3.0]).await;
        let transport = Arc::new(ScriptedTransport::reachable());
        transport.script([Ok(()), Err(DeliveryError::Network("flaky".into())), Ok(())]);
        let drainer = ReplayDrainer::new(store.clone(), transport.clone());

        let pass = drainer.drain().await.unwrap();

        let report = pass.report().unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.remaining, 2);
        assert_eq!(report.halted_at, Some(keys[1]));

        // entry 3 was never sent ahead of entry 2
        assert_eq!(transport.attempts(), 2);
        let lats: Vec<f64> = transport.delivered().iter().map(|s| s.location.lat).collect();
        assert_eq!(lats, vec![1.0]);

        let left: Vec<SubmissionKey> = iterate(&*store)
            .collect()
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(left, vec![keys[1], keys[2]]);
    }

    #[tokio::test]
    async fn next_pass_resumes_from_oldest_remaining_entry() {
        let (store, _) = seeded(&[1.0, 2.0]).await;
        let transport = Arc::new(ScriptedTransport::unreachable());
        let drainer = ReplayDrainer::new(store.clone(), transport.clone());

        let first = drainer.drain().await.unwrap();
        assert_eq!(first.report().unwrap().delivered, 0);
        assert_eq!(first.report().unwrap().remaining, 2);

        transport.set_reachable(true);
        let second = drainer.drain().await.unwrap();
        assert_eq!(second.report().unwrap().delivered, 2);

        let lats: Vec<f64> = transport.delivered().iter().map(|s| s.location.lat).collect();
        assert_eq!(lats, vec![1.0, 2.0]);
    }

    #[tokio::test]
    async fn empty_store_is_a_clean_noop() {
        let (store, _) = seeded(&[]).await;
        let drainer = ReplayDrainer::new(store, Arc::new(ScriptedTransport::reachable()));
        let pass = drainer.drain().await.unwrap();
        assert_eq!(pass.report().unwrap().delivered, 0);
        assert!(pass.report().unwrap().is_clean());
    }

    /// Blocks every delivery until released.
    struct Held {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl SubmissionTransport for Held {
        async fn deliver(&self, _submission: &Submission) -> Result<Receipt, DeliveryError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(Receipt::default())
        }
    }

    #[tokio::test]
    async fn concurrent_trigger_is_coalesced() {
        let (store, _) = seeded(&[1.0]).await;
        let held = Arc::new(Held {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let drainer = Arc::new(ReplayDrainer::new(store.clone(), held.clone()));

        let first = tokio::spawn({
            let drainer = drainer.clone();
            async move { drainer.drain().await }
        });
        held.entered.notified().await;
        assert!(drainer.is_draining());

        let second = drainer.drain().await.unwrap();
        assert_eq!(second, Pass::Coalesced);

        held.release.notify_one();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first.report().unwrap().delivered, 1);
        assert!(store.is_empty().await.unwrap());
        assert!(!drainer.is_draining());
    }
}
