//! waypost-core
//!
//! Offline-resilient delivery of location submissions.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（keys, submission, captured request, outcome, errors）
//! - **ports**: 抽象化レイヤー（DurableQueue, transports, Clock, GeolocationProvider）
//! - **app**: アプリケーションロジック（client, drainer, interceptor, sync loop, builder）
//! - **impls**: 実装（SQLite / in-memory キュー、HTTP transport、probe、テスト用 transport）
//! - **config**: TOML + 環境変数による設定

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{AppBuilder, Waypost};
pub use config::Config;
