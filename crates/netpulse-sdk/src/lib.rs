//! Asynchronous client for the netpulse monitor REST API.
//!
//! Every call is a single request/response. Non-2xx responses surface the
//! server's `{detail}` message verbatim and are never retried. A successful
//! response does not touch any local state: the authoritative change arrives
//! later on the event stream.

pub mod validation;

use netpulse_proto::{
    CommandAck, ErrorBody, GenerateReportResponse, ReportsResponse, StatusResponse, TargetSpec,
    TargetsResponse, ToggleRequest,
};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

pub use validation::ValidationError;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server rejected request ({status}): {detail}")]
    Server { status: StatusCode, detail: String },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("invalid monitor base url {0:?}")]
    BaseUrl(String),
}

impl CommandError {
    /// The server's own explanation, when the failure came from the server.
    pub fn detail(&self) -> Option<&str> {
        match self {
            CommandError::Server { detail, .. } => Some(detail),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            CommandError::Server { status, .. } => Some(*status),
            CommandError::Http(err) => err.status(),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MonitorClient {
    http: Client,
    base_url: Url,
}

impl MonitorClient {
    pub fn new(base_url: &str) -> Result<Self, CommandError> {
        Self::with_http(Client::new(), base_url)
    }

    pub fn with_http(http: Client, base_url: &str) -> Result<Self, CommandError> {
        let base_url =
            Url::parse(base_url).map_err(|_| CommandError::BaseUrl(base_url.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(CommandError::BaseUrl(base_url.to_string()));
        }
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `GET /api/status`
    pub async fn status(&self) -> Result<StatusResponse, CommandError> {
        let url = self.endpoint(&["api", "status"])?;
        decode(self.http.get(url).send().await?).await
    }

    /// `GET /api/targets`
    pub async fn targets(&self) -> Result<TargetsResponse, CommandError> {
        let url = self.endpoint(&["api", "targets"])?;
        decode(self.http.get(url).send().await?).await
    }

    /// `POST /api/targets/custom`
    pub async fn add_target(&self, spec: &TargetSpec) -> Result<CommandAck, CommandError> {
        let spec = validation::validate_spec(spec)?;
        let url = self.endpoint(&["api", "targets", "custom"])?;
        debug!(ip = %spec.ip, "adding custom target");
        decode(self.http.post(url).json(&spec).send().await?).await
    }

    /// `PUT /api/targets/custom/{old_ip}`. `spec.ip` may differ from `old_ip`,
    /// which renames the target.
    pub async fn update_target(
        &self,
        old_ip: &str,
        spec: &TargetSpec,
    ) -> Result<CommandAck, CommandError> {
        validation::validate_ip(old_ip)?;
        let spec = validation::validate_spec(spec)?;
        let url = self.endpoint(&["api", "targets", "custom", old_ip.trim()])?;
        debug!(old_ip, ip = %spec.ip, "updating custom target");
        decode(self.http.put(url).json(&spec).send().await?).await
    }

    /// `DELETE /api/targets/custom/{ip}`
    pub async fn remove_target(&self, ip: &str) -> Result<CommandAck, CommandError> {
        validation::validate_ip(ip)?;
        let url = self.endpoint(&["api", "targets", "custom", ip.trim()])?;
        debug!(ip, "removing custom target");
        decode(self.http.delete(url).send().await?).await
    }

    /// `PUT /api/targets/toggle`. Works for built-in and custom targets.
    pub async fn toggle_target(&self, ip: &str, enabled: bool) -> Result<CommandAck, CommandError> {
        validation::validate_toggle_key(ip)?;
        let url = self.endpoint(&["api", "targets", "toggle"])?;
        let body = ToggleRequest {
            ip: ip.trim().to_string(),
            enabled,
        };
        decode(self.http.put(url).json(&body).send().await?).await
    }

    /// `POST /api/reports/generate`
    pub async fn generate_report(&self) -> Result<GenerateReportResponse, CommandError> {
        let url = self.endpoint(&["api", "reports", "generate"])?;
        decode(self.http.post(url).send().await?).await
    }

    /// `GET /api/reports`
    pub async fn list_reports(&self) -> Result<ReportsResponse, CommandError> {
        let url = self.endpoint(&["api", "reports"])?;
        decode(self.http.get(url).send().await?).await
    }

    /// `GET /api/reports/{filename}`. The document is returned untouched.
    pub async fn report(&self, filename: &str) -> Result<serde_json::Value, CommandError> {
        let url = self.endpoint(&["api", "reports", filename])?;
        decode(self.http.get(url).send().await?).await
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, CommandError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CommandError::BaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

async fn decode<T>(res: Response) -> Result<T, CommandError>
where
    T: DeserializeOwned,
{
    let status = res.status();
    if status.is_success() {
        return Ok(res.json::<T>().await?);
    }

    let body = res.text().await.unwrap_or_default();
    let detail = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(error) => error.detail,
        Err(_) if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
        Err(_) => body,
    };
    warn!(status = %status, detail = %detail, "monitor command rejected");
    Err(CommandError::Server { status, detail })
}
