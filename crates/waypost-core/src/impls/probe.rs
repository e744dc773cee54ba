//! HttpProbe - 到達性を定期的に確認して ConnectivitySignal を更新する
//!
//! Any HTTP answer counts as reachable. Only the offline→online edge fires
//! `notify_online`; staying online does not re-trigger a drain.

use std::time::Duration;

use reqwest::Client;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::app::{Connectivity, ConnectivitySignal};

pub struct HttpProbe {
    url: String,
    interval: Duration,
    client: Client,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, interval: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(interval.max(Duration::from_secs(1))).build()?;
        Ok(Self {
            url: url.into(),
            interval,
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// One reachability check.
    pub async fn check(&self) -> bool {
        match self.client.head(&self.url).send().await {
            Ok(response) => {
                debug!(url = %self.url, status = response.status().as_u16(), "Probe answered");
                true
            }
            Err(e) => {
                debug!(url = %self.url, error = %e, "Probe failed");
                false
            }
        }
    }

    /// Poll until `shutdown` flips to true (or its sender is dropped).
    pub fn spawn(
        self,
        signal: ConnectivitySignal,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                    _ = ticker.tick() => {}
                }
                let reachable = self.check().await;
                observe(&signal, reachable);
            }
        })
    }
}

/// Fold one probe result into the signal.
pub(crate) fn observe(signal: &ConnectivitySignal, reachable: bool) {
    match (signal.current(), reachable) {
        (Connectivity::Offline, true) => {
            info!("Connectivity restored");
            signal.notify_online();
        }
        (Connectivity::Online, false) => {
            info!("Connectivity lost");
            signal.mark_offline();
        }
        _ => {}
    }
}
