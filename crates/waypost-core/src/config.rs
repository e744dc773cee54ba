//! Configuration - TOML ファイル + 環境変数
//!
//! 優先順位: 既定値 < `config.toml` < `WAYPOST_*` 環境変数 < CLI フラグ（CLI 側で上書き）

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app::{DeviceInfo, InterceptRoute};
use crate::domain::WireFormat;
use crate::impls::HttpTransportConfig;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:3000/api/locations";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_DATABASE_FILE: &str = "waypost.db";

pub const ENV_ENDPOINT: &str = "WAYPOST_ENDPOINT";
pub const ENV_TIMEOUT_SECS: &str = "WAYPOST_TIMEOUT_SECS";
pub const ENV_DB_PATH: &str = "WAYPOST_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "WAYPOST_LOG_LEVEL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub delivery: DeliveryConfig,
    pub intercept: InterceptConfig,
    pub storage: StorageConfig,
    pub device: DeviceConfig,
    pub sync: SyncConfig,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub endpoint: String,
    pub wire_format: WireFormat,
    pub timeout_secs: u64,
    pub app_version: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            wire_format: WireFormat::Standard,
            timeout_secs: 15,
            app_version: "1.0.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptConfig {
    pub method: String,
    pub path_prefix: String,
}

impl Default for InterceptConfig {
    fn default() -> Self {
        let route = InterceptRoute::default();
        Self {
            method: route.method,
            path_prefix: route.path_prefix,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `None` → `<data dir>/waypost/waypost.db`.
    pub database_path: Option<PathBuf>,
    pub submissions_table: String,
    pub requests_table: String,
    /// Per-queue cap. Unbounded when unset.
    pub max_entries: Option<usize>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            submissions_table: "offline_locations".to_string(),
            requests_table: "intercepted_requests".to_string(),
            max_entries: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub platform: Option<String>,
    pub agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Health URL polled by the probe; `<endpoint origin>/health` when unset.
    pub probe_url: Option<String>,
    pub probe_interval_secs: u64,
    pub safety_net_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            probe_url: None,
            probe_interval_secs: 10,
            safety_net_secs: 60,
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location when `None`. A missing
    /// file yields the defaults. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).or_else(default_config_path);
        let mut config = match path {
            Some(path) if path.exists() => Self::load_from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `WAYPOST_*` overrides read through `lookup`.
    pub fn apply_env_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(endpoint) = lookup(ENV_ENDPOINT) {
            self.delivery.endpoint = endpoint;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            self.delivery.timeout_secs = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                field: "delivery.timeout_secs",
                reason: format!("{ENV_TIMEOUT_SECS}={raw:?} is not a whole number of seconds"),
            })?;
        }
        if let Some(path) = lookup(ENV_DB_PATH) {
            self.storage.database_path = Some(PathBuf::from(path));
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = Some(level);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.delivery.endpoint).map_err(|e| ConfigError::Invalid {
            field: "delivery.endpoint",
            reason: e.to_string(),
        })?;
        if self.delivery.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "delivery.timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.storage.submissions_table == self.storage.requests_table {
            return Err(ConfigError::Invalid {
                field: "storage.requests_table",
                reason: "must differ from storage.submissions_table".to_string(),
            });
        }
        if self.storage.max_entries == Some(0) {
            return Err(ConfigError::Invalid {
                field: "storage.max_entries",
                reason: "must be at least 1 when set".to_string(),
            });
        }
        if self.sync.safety_net_secs == 0 || self.sync.probe_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "sync",
                reason: "intervals must be at least 1 second".to_string(),
            });
        }
        Ok(())
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery.timeout_secs)
    }

    pub fn database_path(&self) -> PathBuf {
        self.storage.database_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("waypost")
                .join(DEFAULT_DATABASE_FILE)
        })
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn transport_config(&self) -> HttpTransportConfig {
        HttpTransportConfig {
            endpoint: self.delivery.endpoint.clone(),
            wire_format: self.delivery.wire_format,
            app_version: self.delivery.app_version.clone(),
        }
    }

    pub fn route(&self) -> InterceptRoute {
        InterceptRoute::new(&self.intercept.method, &self.intercept.path_prefix)
    }

    pub fn device_info(&self) -> DeviceInfo {
        let default = DeviceInfo::default();
        DeviceInfo {
            platform: self.device.platform.clone().unwrap_or(default.platform),
            agent: self.device.agent.clone().unwrap_or(default.agent),
        }
    }

    /// Probe URL, defaulting to the server's `/health` route.
    pub fn probe_url(&self) -> String {
        if let Some(url) = &self.sync.probe_url {
            return url.clone();
        }
        match url::Url::parse(&self.delivery.endpoint).and_then(|url| url.join("/health")) {
            Ok(url) => url.to_string(),
            Err(_) => self.delivery.endpoint.clone(),
        }
    }
}

/// `<config dir>/waypost/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("waypost").join("config.toml"))
}
