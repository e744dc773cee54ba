//! Status - 滞留件数と実行中のパスをまとめたスナップショット

use serde::{Deserialize, Serialize};

use super::connectivity::Connectivity;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Submissions waiting for the drainer.
    pub pending_submissions: usize,
    /// Captured requests waiting for replay.
    pub pending_requests: usize,
    pub connectivity: Connectivity,
    pub drain_in_progress: bool,
    pub replay_in_progress: bool,
}

impl QueueStatus {
    pub fn is_idle(&self) -> bool {
        self.pending_submissions == 0
            && self.pending_requests == 0
            && !self.drain_in_progress
            && !self.replay_in_progress
    }
}
