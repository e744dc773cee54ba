//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # Fail-fast 設計
//! - 必須コンポーネント（2 つのキューと 2 つの transport）が揃っているかを build() 時にチェック
//! - 不足があれば全部まとめて BuildError::MissingComponents で返す

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::client::{DEFAULT_DELIVERY_TIMEOUT, DeviceInfo, SubmissionClient};
use super::connectivity::ConnectivitySignal;
use super::drainer::ReplayDrainer;
use super::interceptor::{InterceptRoute, InterceptionLayer};
use super::sync_loop::DEFAULT_SAFETY_NET;
use super::waypost::Waypost;
use crate::config::Config;
use crate::domain::{CapturedRequest, StorageError, Submission};
use crate::impls::{HttpTransport, SqliteQueue, open_connection};
use crate::ports::{
    Clock, DEFAULT_POSITION_TIMEOUT, DurableQueue, GeolocationProvider, RequestTransport,
    SubmissionTransport, SystemClock,
};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing components: {0:?}. These must be provided before build().")]
    MissingComponents(Vec<&'static str>),

    #[error("storage setup failed: {0}")]
    Storage(#[from] StorageError),

    #[error("HTTP client setup failed: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// ```ignore
/// let app = AppBuilder::new()
///     .submission_store(store)
///     .request_queue(queue)
///     .transport(transport)
///     .build()?;
/// ```
pub struct AppBuilder {
    submissions: Option<Arc<dyn DurableQueue<Submission>>>,
    requests: Option<Arc<dyn DurableQueue<CapturedRequest>>>,
    submission_transport: Option<Arc<dyn SubmissionTransport>>,
    request_transport: Option<Arc<dyn RequestTransport>>,
    clock: Arc<dyn Clock>,
    device: DeviceInfo,
    route: InterceptRoute,
    timeout: Duration,
    geolocation: Option<Arc<dyn GeolocationProvider>>,
    position_timeout: Duration,
    signal: ConnectivitySignal,
    safety_net: Duration,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            submissions: None,
            requests: None,
            submission_transport: None,
            request_transport: None,
            clock: Arc::new(SystemClock),
            device: DeviceInfo::default(),
            route: InterceptRoute::default(),
            timeout: DEFAULT_DELIVERY_TIMEOUT,
            geolocation: None,
            position_timeout: DEFAULT_POSITION_TIMEOUT,
            signal: ConnectivitySignal::default(),
            safety_net: DEFAULT_SAFETY_NET,
        }
    }

    pub fn submission_store(mut self, store: Arc<dyn DurableQueue<Submission>>) -> Self {
        self.submissions = Some(store);
        self
    }

    pub fn request_queue(mut self, queue: Arc<dyn DurableQueue<CapturedRequest>>) -> Self {
        self.requests = Some(queue);
        self
    }

    pub fn submission_transport(mut self, transport: Arc<dyn SubmissionTransport>) -> Self {
        self.submission_transport = Some(transport);
        self
    }

    pub fn request_transport(mut self, transport: Arc<dyn RequestTransport>) -> Self {
        self.request_transport = Some(transport);
        self
    }

    /// Use one transport for both submissions and intercepted requests.
    pub fn transport<T>(self, transport: Arc<T>) -> Self
    where
        T: SubmissionTransport + RequestTransport + 'static,
    {
        self.submission_transport(transport.clone())
            .request_transport(transport)
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn device(mut self, device: DeviceInfo) -> Self {
        self.device = device;
        self
    }

    pub fn route(mut self, route: InterceptRoute) -> Self {
        self.route = route;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn geolocation(mut self, provider: Arc<dyn GeolocationProvider>) -> Self {
        self.geolocation = Some(provider);
        self
    }

    pub fn position_timeout(mut self, timeout: Duration) -> Self {
        self.position_timeout = timeout;
        self
    }

    pub fn signal(mut self, signal: ConnectivitySignal) -> Self {
        self.signal = signal;
        self
    }

    pub fn safety_net(mut self, interval: Duration) -> Self {
        self.safety_net = interval;
        self
    }

    pub fn build(self) -> Result<Waypost, BuildError> {
        let mut missing = Vec::new();
        if self.submissions.is_none() {
            missing.push("submission_store");
        }
        if self.requests.is_none() {
            missing.push("request_queue");
        }
        if self.submission_transport.is_none() {
            missing.push("submission_transport");
        }
        if self.request_transport.is_none() {
            missing.push("request_transport");
        }
        let (Some(submissions), Some(requests), Some(submission_transport), Some(request_transport)) = (
            self.submissions,
            self.requests,
            self.submission_transport,
            self.request_transport,
        ) else {
            return Err(BuildError::MissingComponents(missing));
        };

        let client = SubmissionClient::new(
            submissions.clone(),
            submission_transport.clone(),
            self.clock,
            self.device,
        )
        .with_timeout(self.timeout);
        let drainer = ReplayDrainer::new(submissions.clone(), submission_transport)
            .with_timeout(self.timeout);
        let interceptor = InterceptionLayer::new(requests.clone(), request_transport, self.route)
            .with_timeout(self.timeout);

        Ok(Waypost {
            client,
            drainer: Arc::new(drainer),
            interceptor: Arc::new(interceptor),
            submissions,
            requests,
            geolocation: self.geolocation,
            position_timeout: self.position_timeout,
            signal: self.signal,
            safety_net: self.safety_net,
        })
    }

    /// Wire the production stack from `config`: one SQLite file holding both
    /// queues as separate tables, and one HTTP transport.
    pub async fn from_config(config: &Config) -> Result<Self, BuildError> {
        let db_path = config.database_path();
        let conn = open_connection(&db_path).await?;

        let mut submissions =
            SqliteQueue::<Submission>::attach(conn.clone(), &config.storage.submissions_table)
                .await?;
        let mut requests =
            SqliteQueue::<CapturedRequest>::attach(conn, &config.storage.requests_table).await?;
        if let Some(cap) = config.storage.max_entries {
            submissions = submissions.with_capacity_limit(cap);
            requests = requests.with_capacity_limit(cap);
        }

        let transport = Arc::new(HttpTransport::new(config.transport_config())?);

        info!(
            database = %db_path.display(),
            endpoint = %config.delivery.endpoint,
            "Waypost configured"
        );

        Ok(Self::new()
            .submission_store(Arc::new(submissions))
            .request_queue(Arc::new(requests))
            .transport(transport)
            .device(config.device_info())
            .route(config.route())
            .timeout(config.delivery_timeout())
            .safety_net(Duration::from_secs(config.sync.safety_net_secs)))
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}
