//! SyncLoop - オンライン通知と定期 tick で drain / replay を回す
//!
//! - `shutdown_tx` を送る（または drop する）とループが止まる
//! - `join()` でループの終了を待てる。StorageError で止まった場合はそれを返す
//!
//! A pass already running when a trigger arrives is coalesced by the
//! drainer's and interceptor's own gates, so triggers can pile up freely.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::connectivity::{Connectivity, ConnectivitySignal};
use super::drainer::ReplayDrainer;
use super::interceptor::InterceptionLayer;
use crate::domain::StorageError;

/// Safety-net tick in case the connectivity signal never fires.
pub const DEFAULT_SAFETY_NET: Duration = Duration::from_secs(60);

pub struct SyncLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<Result<(), StorageError>>,
}

impl SyncLoop {
    pub fn spawn(
        drainer: Arc<ReplayDrainer>,
        interceptor: Arc<InterceptionLayer>,
        signal: ConnectivitySignal,
        safety_net: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let online_rx = signal.subscribe();
        let join = tokio::spawn(async move {
            sync_loop(drainer, interceptor, online_rx, safety_net, shutdown_rx).await
        });
        Self { shutdown_tx, join }
    }

    /// Stop after the current pass. In-flight deliveries are not cancelled.
    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already have exited
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the loop to exit on its own.
    pub async fn join(self) -> Result<(), StorageError> {
        let Self { shutdown_tx, join } = self;
        let result = join.await;
        drop(shutdown_tx);
        match result {
            Ok(result) => result,
            Err(e) => Err(StorageError::Backend(format!("sync loop task failed: {e}"))),
        }
    }

    pub async fn shutdown_and_join(self) -> Result<(), StorageError> {
        self.request_shutdown();
        self.join().await
    }
}

async fn sync_loop(
    drainer: Arc<ReplayDrainer>,
    interceptor: Arc<InterceptionLayer>,
    mut online_rx: watch::Receiver<Connectivity>,
    safety_net: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), StorageError> {
    let mut ticker = tokio::time::interval(safety_net);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // interval の最初の tick は即時に返るので消費しておく
    ticker.tick().await;

    if *online_rx.borrow_and_update() == Connectivity::Online {
        run_passes(&drainer, &interceptor, "startup").await?;
    }

    // 通知元が全部 drop されたら safety-net tick だけで回す
    let mut signal_open = true;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let trigger = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            changed = online_rx.changed(), if signal_open => {
                if changed.is_err() {
                    signal_open = false;
                    continue;
                }
                if *online_rx.borrow_and_update() != Connectivity::Online {
                    continue;
                }
                "online"
            }
            _ = ticker.tick() => "safety-net",
        };

        run_passes(&drainer, &interceptor, trigger).await?;
    }

    info!("Sync loop stopped");
    Ok(())
}

async fn run_passes(
    drainer: &ReplayDrainer,
    interceptor: &InterceptionLayer,
    trigger: &'static str,
) -> Result<(), StorageError> {
    debug!(trigger, "Running sync passes");
    let stop = |e: StorageError| {
        error!(trigger, error = %e, "Sync pass hit a storage error; stopping");
        e
    };
    drainer.drain().await.map_err(&stop)?;
    interceptor.replay().await.map_err(&stop)?;
    Ok(())
}
