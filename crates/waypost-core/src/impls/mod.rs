//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **SqliteQueue**: 本番用の永続キュー（再起動後も残る）
//! - **InMemoryQueue**: テスト・一時利用向けキュー
//! - **HttpTransport**: 受付エンドポイントへの HTTP 配送
//! - **HttpProbe**: 到達性の定期確認
//! - **ScriptedTransport**: テスト用の配送先

pub mod http;
pub mod inmem_queue;
pub mod probe;
pub mod scripted;
pub mod sqlite_queue;

pub use self::http::{HttpTransport, HttpTransportConfig};
pub use self::inmem_queue::InMemoryQueue;
pub use self::probe::HttpProbe;
pub use self::scripted::ScriptedTransport;
pub use self::sqlite_queue::{SqliteQueue, open_connection, open_in_memory_connection};
