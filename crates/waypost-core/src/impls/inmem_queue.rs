//! In-memory durable queue (tests, ephemeral sessions).
//!
//! Nothing here survives a restart; production wiring uses `SqliteQueue`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{Key, QueuePayload, StorageError};
use crate::ports::DurableQueue;

struct InMemoryQueueState<P> {
    /// Entries by key (single source of truth, ordered).
    entries: BTreeMap<u64, P>,

    /// Next key to assign. Never decremented, so keys are never reused.
    next_key: u64,
}

pub struct InMemoryQueue<P: QueuePayload> {
    state: Mutex<InMemoryQueueState<P>>,
    capacity: Option<usize>,
}

impl<P: QueuePayload> InMemoryQueue<P> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(InMemoryQueueState {
                entries: BTreeMap::new(),
                next_key: 1,
            }),
            capacity: None,
        }
    }

    /// Refuse appends once `capacity` entries are pending.
    pub fn with_capacity_limit(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }
}

impl<P: QueuePayload> Default for InMemoryQueue<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<P: QueuePayload> DurableQueue<P> for InMemoryQueue<P> {
    async fn append(&self, payload: P) -> Result<Key<P>, StorageError> {
        let mut state = self.state.lock().await;
        if let Some(capacity) = self.capacity {
            if state.entries.len() >= capacity {
                return Err(StorageError::CapacityExceeded { capacity });
            }
        }
        let key = state.next_key;
        state.next_key += 1;
        state.entries.insert(key, payload);
        Ok(Key::new(key))
    }

    async fn next_after(&self, after: Option<Key<P>>) -> Result<Option<(Key<P>, P)>, StorageError> {
        let state = self.state.lock().await;
        let entry = match after {
            Some(after) => state.entries.range(after.get() + 1..).next(),
            None => state.entries.iter().next(),
        };
        Ok(entry.map(|(k, p)| (Key::new(*k), p.clone())))
    }

    async fn remove(&self, key: Key<P>) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        state.entries.remove(&key.get());
        Ok(())
    }

    async fn len(&self) -> Result<usize, StorageError> {
        Ok(self.state.lock().await.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CapturedRequest;
    use crate::ports::iterate;
    use chrono::Utc;

    fn req(n: u8) -> CapturedRequest {
        CapturedRequest::new("POST", format!("http://h/api/locations/{n}"), Utc::now())
    }

    #[tokio::test]
    async fn append_assigns_increasing_keys() {
        let q = InMemoryQueue::new();
        let k1 = q.append(req(1)).await.unwrap();
        let k2 = q.append(req(2)).await.unwrap();
        assert!(k2 > k1);
        assert_eq!(q.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn keys_are_not_reused_after_remove() {
        let q = InMemoryQueue::new();
        let k1 = q.append(req(1)).await.unwrap();
        q.remove(k1).await.unwrap();
        let k2 = q.append(req(2)).await.unwrap();
        assert!(k2 > k1);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let q = InMemoryQueue::new();
        let k1 = q.append(req(1)).await.unwrap();
        let k2 = q.append(req(2)).await.unwrap();

        q.remove(k1).await.unwrap();
        let once = iterate(&q).collect().await.unwrap();
        q.remove(k1).await.unwrap();
        let twice = iterate(&q).collect().await.unwrap();

        assert_eq!(once, twice);
        assert_eq!(twice.len(), 1);
        assert_eq!(twice[0].0, k2);
    }

    #[tokio::test]
    async fn cursor_skips_entries_removed_mid_iteration() {
        let q = InMemoryQueue::new();
        let k1 = q.append(req(1)).await.unwrap();
        let k2 = q.append(req(2)).await.unwrap();
        let k3 = q.append(req(3)).await.unwrap();

        let mut cursor = iterate(&q);
        assert_eq!(cursor.next().await.unwrap().unwrap().0, k1);

        q.remove(k2).await.unwrap();
        assert_eq!(cursor.next().await.unwrap().unwrap().0, k3);
        assert!(cursor.next().await.unwrap().is_none());

        cursor.restart();
        assert_eq!(cursor.next().await.unwrap().unwrap().0, k1);
    }

    #[tokio::test]
    async fn capacity_limit_rejects_appends() {
        let q = InMemoryQueue::new().with_capacity_limit(1);
        q.append(req(1)).await.unwrap();
        let err = q.append(req(2)).await.unwrap_err();
        assert_eq!(err, StorageError::CapacityExceeded { capacity: 1 });
        assert_eq!(q.len().await.unwrap(), 1);
    }
}
