//! PassGate - 同時に 1 パスだけ走らせるためのフラグ
//!
//! In-process only; the queues it protects are process-local.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct PassGate {
    busy: AtomicBool,
}

impl PassGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the gate, or `None` when a pass is already running.
    pub fn try_enter(&self) -> Option<PassGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PassGuard { busy: &self.busy })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the gate when dropped, on every exit path.
#[derive(Debug)]
pub struct PassGuard<'a> {
    busy: &'a AtomicBool,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
