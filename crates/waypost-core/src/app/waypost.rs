//! Waypost - プロセスに 1 つだけ作る、組み立て済みのインスタンス
//!
//! Owns the submission client, the drainer, the interception layer and the
//! connectivity signal. Built by `AppBuilder`.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use super::client::SubmissionClient;
use super::connectivity::ConnectivitySignal;
use super::drainer::ReplayDrainer;
use super::interceptor::InterceptionLayer;
use super::status::QueueStatus;
use super::sync_loop::SyncLoop;
use crate::domain::{
    CapturedRequest, DrainPass, InterceptError, InterceptedResponse, ReplayPass, StorageError,
    Submission, SubmitError, SubmitOutcome,
};
use crate::ports::{DurableQueue, GeolocationProvider, PositionError, locate_with_timeout};

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("no geolocation provider configured")]
    NoProvider,

    #[error(transparent)]
    Position(#[from] PositionError),

    #[error(transparent)]
    Submit(#[from] SubmitError),
}

pub struct Waypost {
    pub(crate) client: SubmissionClient,
    pub(crate) drainer: Arc<ReplayDrainer>,
    pub(crate) interceptor: Arc<InterceptionLayer>,
    pub(crate) submissions: Arc<dyn DurableQueue<Submission>>,
    pub(crate) requests: Arc<dyn DurableQueue<CapturedRequest>>,
    pub(crate) geolocation: Option<Arc<dyn GeolocationProvider>>,
    pub(crate) position_timeout: Duration,
    pub(crate) signal: ConnectivitySignal,
    pub(crate) safety_net: Duration,
}

impl Waypost {
    pub async fn submit(&self, lat: f64, lng: f64) -> Result<SubmitOutcome, SubmitError> {
        self.client.submit(lat, lng).await
    }

    pub async fn submit_with_timeout(
        &self,
        lat: f64,
        lng: f64,
        timeout: Duration,
    ) -> Result<SubmitOutcome, SubmitError> {
        self.client.submit_with_timeout(lat, lng, timeout).await
    }

    pub async fn drain(&self) -> Result<DrainPass, StorageError> {
        self.drainer.drain().await
    }

    pub async fn fetch(
        &self,
        request: CapturedRequest,
    ) -> Result<InterceptedResponse, InterceptError> {
        self.interceptor.fetch(request).await
    }

    pub async fn replay(&self) -> Result<ReplayPass, StorageError> {
        self.interceptor.replay().await
    }

    /// Ask the geolocation provider for a fix and submit it.
    pub async fn report_current_location(&self) -> Result<SubmitOutcome, LocateError> {
        let provider = self.geolocation.as_deref().ok_or(LocateError::NoProvider)?;
        let position = locate_with_timeout(provider, self.position_timeout).await?;
        Ok(self.client.submit(position.lat, position.lng).await?)
    }

    pub async fn status(&self) -> Result<QueueStatus, StorageError> {
        Ok(QueueStatus {
            pending_submissions: self.submissions.len().await?,
            pending_requests: self.requests.len().await?,
            connectivity: self.signal.current(),
            drain_in_progress: self.drainer.is_draining(),
            replay_in_progress: self.interceptor.is_replaying(),
        })
    }

    /// Start the background loop that drains and replays on every online
    /// signal and on the safety-net tick.
    pub fn spawn_sync_loop(&self) -> SyncLoop {
        info!(safety_net_secs = self.safety_net.as_secs(), "Starting sync loop");
        SyncLoop::spawn(
            self.drainer.clone(),
            self.interceptor.clone(),
            self.signal.clone(),
            self.safety_net,
        )
    }

    pub fn notify_online(&self) {
        self.signal.notify_online();
    }

    pub fn signal(&self) -> &ConnectivitySignal {
        &self.signal
    }

    pub fn client(&self) -> &SubmissionClient {
        &self.client
    }

    pub fn interceptor(&self) -> &InterceptionLayer {
        &self.interceptor
    }
}
