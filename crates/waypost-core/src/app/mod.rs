//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **SubmissionClient**: 直接送信、失敗したらストアに積む
//! - **ReplayDrainer**: ストアを古い順に再送（最初の失敗で停止）
//! - **InterceptionLayer**: 失敗したリクエストを捕捉・再送
//! - **SyncLoop**: オンライン通知と safety-net tick で drain / replay を回す

pub mod builder;
pub mod client;
pub mod connectivity;
pub mod deadline;
pub mod drainer;
pub mod gate;
pub mod interceptor;
pub mod status;
pub mod sync_loop;
pub mod waypost;

// 主要な型を再エクスポート
pub use self::builder::{AppBuilder, BuildError};
pub use self::client::{DEFAULT_DELIVERY_TIMEOUT, DeviceInfo, SubmissionClient};
pub use self::connectivity::{Connectivity, ConnectivitySignal};
pub use self::drainer::ReplayDrainer;
pub use self::interceptor::{InterceptRoute, InterceptionLayer};
pub use self::status::QueueStatus;
pub use self::sync_loop::{DEFAULT_SAFETY_NET, SyncLoop};
pub use self::waypost::{LocateError, Waypost};
