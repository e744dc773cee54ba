//! HTTP transport for the remote acceptance endpoint.

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::{
    CapturedRequest, DeliveryError, InterceptedResponse, Receipt, Submission, WireFormat,
};
use crate::ports::{RequestTransport, SubmissionTransport};

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Acceptance endpoint, e.g. `https://host/api/locations`.
    pub endpoint: String,
    pub wire_format: WireFormat,
    /// Sent as `X-App-Version`.
    pub app_version: String,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000/api/locations".to_string(),
            wire_format: WireFormat::Standard,
            app_version: "1.0.0".to_string(),
        }
    }
}

/// Body of a 2xx answer. The legacy endpoint says `id`, the current one
/// `locationId`; ids may be strings or numbers.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AcceptanceBody {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default, alias = "id")]
    location_id: Option<serde_json::Value>,
    #[serde(default)]
    timestamp: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Body of a non-2xx answer.
#[derive(Debug, Deserialize)]
struct RejectionBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn value_to_string(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// No client-wide timeout: each attempt is bounded by the caller's
/// deadline (`with_deadline`), which may be longer or shorter per call.
pub struct HttpTransport {
    config: HttpTransportConfig,
    client: Client,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    fn map_error(&self, e: reqwest::Error) -> DeliveryError {
        DeliveryError::Network(e.to_string())
    }
}

#[async_trait]
impl SubmissionTransport for HttpTransport {
    async fn deliver(&self, submission: &Submission) -> Result<Receipt, DeliveryError> {
        let body = submission.to_wire(self.config.wire_format);

        debug!(
            url = %self.config.endpoint,
            submission_id = %submission.metadata.submission_id,
            "Delivering submission"
        );

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("X-App-Version", &self.config.app_version)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_error(e))?;

        if !status.is_success() {
            let message = serde_json::from_str::<RejectionBody>(&text)
                .ok()
                .and_then(|b| b.error.or(b.message))
                .unwrap_or_else(|| "Server rejected the request".to_string());
            warn!(status = status.as_u16(), message = %message, "Submission rejected");
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let accepted: AcceptanceBody =
            serde_json::from_str(&text).map_err(|e| DeliveryError::Decode(e.to_string()))?;

        match accepted.success {
            Some(true) => Ok(Receipt {
                location_id: accepted.location_id.and_then(value_to_string),
                accepted_at: accepted.timestamp.and_then(value_to_string),
            }),
            Some(false) => Err(DeliveryError::NotAccepted(
                accepted.error.unwrap_or_else(|| "success=false".to_string()),
            )),
            None => Err(DeliveryError::NotAccepted(
                "response carries no success indicator".to_string(),
            )),
        }
    }
}

#[async_trait]
impl RequestTransport for HttpTransport {
    async fn send(&self, request: &CapturedRequest) -> Result<InterceptedResponse, DeliveryError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| DeliveryError::Network(format!("invalid method {:?}: {e}", request.method)))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(|e| self.map_error(e))?.to_vec();

        Ok(InterceptedResponse {
            status,
            headers,
            body,
        })
    }
}
