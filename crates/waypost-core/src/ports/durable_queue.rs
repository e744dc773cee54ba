//! DurableQueue port - 確定前のエントリを保持する永続 FIFO
//!
//! The submission store and the interception layer's request queue are two
//! separate instances of this abstraction, parameterized over their payload.
//!
//! # 設計原則
//! - append / remove は 1 エントリ単位でアトミック（それ以上のトランザクションは要求しない）
//! - キーは単調増加で再利用しない
//! - 走査はライブ状態を 1 件ずつ読む（削除済みのエントリは返らない）

use async_trait::async_trait;

use crate::domain::{Key, QueuePayload, StorageError};

#[async_trait]
pub trait DurableQueue<P: QueuePayload>: Send + Sync {
    /// Persist a new entry and return its key, strictly greater than every key
    /// this queue has handed out before.
    async fn append(&self, payload: P) -> Result<Key<P>, StorageError>;

    /// First entry with a key greater than `after` (or the head when `None`).
    async fn next_after(&self, after: Option<Key<P>>) -> Result<Option<(Key<P>, P)>, StorageError>;

    /// Delete one entry. Removing a missing key is a no-op.
    async fn remove(&self, key: Key<P>) -> Result<(), StorageError>;

    async fn len(&self) -> Result<usize, StorageError>;

    async fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len().await? == 0)
    }

    /// Earliest entry, if any.
    async fn front(&self) -> Result<Option<(Key<P>, P)>, StorageError> {
        self.next_after(None).await
    }
}

/// Lazy, restartable traversal in ascending key order.
///
/// Every step asks the queue for the entry after the last key it yielded, so
/// entries removed in between are never returned and entries appended later
/// are picked up.
pub struct QueueCursor<'a, P: QueuePayload, Q: DurableQueue<P> + ?Sized> {
    queue: &'a Q,
    last: Option<Key<P>>,
}

impl<'a, P: QueuePayload, Q: DurableQueue<P> + ?Sized> QueueCursor<'a, P, Q> {
    pub fn new(queue: &'a Q) -> Self {
        Self { queue, last: None }
    }

    pub async fn next(&mut self) -> Result<Option<(Key<P>, P)>, StorageError> {
        let entry = self.queue.next_after(self.last).await?;
        if let Some((key, _)) = &entry {
            self.last = Some(*key);
        }
        Ok(entry)
    }

    /// Go back to the head of the queue.
    pub fn restart(&mut self) {
        self.last = None;
    }

    /// Drain the remaining entries into a vector (tests, status dumps).
    pub async fn collect(mut self) -> Result<Vec<(Key<P>, P)>, StorageError> {
        let mut out = Vec::new();
        while let Some(entry) = self.next().await? {
            out.push(entry);
        }
        Ok(out)
    }
}

/// Start a traversal over `queue`.
pub fn iterate<P, Q>(queue: &Q) -> QueueCursor<'_, P, Q>
where
    P: QueuePayload,
    Q: DurableQueue<P> + ?Sized,
{
    QueueCursor::new(queue)
}
