//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」。永続化・ネットワーク・時刻・位置情報の
//! 実装詳細をここで隠蔽する。
//!
//! # 設計原則
//! - ローカルキュー（SQLite）が未確定データの正本
//! - ネットワークは失敗しうるものとして扱う（失敗は値で返す）

pub mod clock;
pub mod durable_queue;
pub mod geolocation;
pub mod transport;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::durable_queue::{DurableQueue, QueueCursor, iterate};
pub use self::geolocation::{
    DEFAULT_POSITION_TIMEOUT, FixedPosition, GeolocationProvider, Position, PositionError,
    locate_with_timeout,
};
pub use self::transport::{RequestTransport, SubmissionTransport};
