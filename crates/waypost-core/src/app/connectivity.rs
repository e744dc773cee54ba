//! ConnectivitySignal - 「接続が戻った」通知
//!
//! Best-effort: the signal may fire more than once for one recovery, and
//! every consumer treats it idempotently.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Online,
    #[default]
    Offline,
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connectivity::Online => f.write_str("online"),
            Connectivity::Offline => f.write_str("offline"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectivitySignal {
    tx: Arc<watch::Sender<Connectivity>>,
}

impl ConnectivitySignal {
    pub fn new(initial: Connectivity) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Wake every subscriber, even when already online.
    pub fn notify_online(&self) {
        self.tx.send_replace(Connectivity::Online);
    }

    pub fn mark_offline(&self) {
        self.tx.send_if_modified(|state| {
            let changed = *state != Connectivity::Offline;
            *state = Connectivity::Offline;
            changed
        });
    }

    pub fn current(&self) -> Connectivity {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivitySignal {
    fn default() -> Self {
        Self::new(Connectivity::Offline)
    }
}
