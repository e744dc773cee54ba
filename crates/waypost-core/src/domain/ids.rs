//! Queue keys (strongly-typed, per payload type).
//!
//! # Phantom Type パターン
//! `Key<P>` は `u64` の連番に payload 型 `P` をマーカーとして付けたもの。
//! `P` は実行時には使わない（PhantomData）ので、サイズは `u64` と同じ。
//! Submission 用のキーと CapturedRequest 用のキーはコンパイル時に混同できない。
//!
//! Keys are assigned by the queue at append time, strictly increasing and never
//! reused (not even after the entry holding them is removed).

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A payload that can live in a durable queue.
///
/// # Trait Bounds
/// - `Serialize + DeserializeOwned`: persisted as JSON by the SQLite adapter
/// - `Clone + Send + Sync + 'static`: handed across tasks behind `Arc`
pub trait QueuePayload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Display prefix for keys of this payload type (例: "sub-", "req-").
    const KEY_PREFIX: &'static str;
}

/// Store key for an entry holding a `P`.
#[repr(transparent)]
pub struct Key<P> {
    value: u64,
    _marker: PhantomData<fn() -> P>,
}

impl<P> Key<P> {
    pub const fn new(value: u64) -> Self {
        Self {
            value,
            _marker: PhantomData,
        }
    }

    pub const fn get(self) -> u64 {
        self.value
    }
}

// derive だと `P: Clone` などを要求してしまうので手で実装する。
impl<P> Clone for Key<P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for Key<P> {}

impl<P> PartialEq for Key<P> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<P> Eq for Key<P> {}

impl<P> PartialOrd for Key<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P> Ord for Key<P> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl<P> Hash for Key<P> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<P: QueuePayload> fmt::Debug for Key<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({}{})", P::KEY_PREFIX, self.value)
    }
}

impl<P: QueuePayload> fmt::Display for Key<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", P::KEY_PREFIX, self.value)
    }
}

impl<P> Serialize for Key<P> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.value)
    }
}

impl<'de, P> Deserialize<'de> for Key<P> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u64::deserialize(deserializer).map(Self::new)
    }
}

/// Key of a queued location submission.
pub type SubmissionKey = Key<super::Submission>;

/// Key of a captured network request.
pub type RequestKey = Key<super::CapturedRequest>;
