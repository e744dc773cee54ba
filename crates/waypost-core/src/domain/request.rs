//! CapturedRequest - 送信に失敗した HTTP リクエストをそのまま保存したもの
//!
//! The interception layer never parses the body; the request is replayed
//! byte-for-byte.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::QueuePayload;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default, with = "base64_body")]
    pub body: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

impl CapturedRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>, captured_at: DateTime<Utc>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
            captured_at,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Request path, or `None` when the url does not parse.
    pub fn path(&self) -> Option<String> {
        url::Url::parse(&self.url).ok().map(|u| u.path().to_string())
    }
}

impl QueuePayload for CapturedRequest {
    const KEY_PREFIX: &'static str = "req-";
}

/// Whatever the server answered to a passed-through or replayed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl InterceptedResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

mod base64_body {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
