use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::constants::endpoints;
use crate::error::{Result, ScreenerError};

/// Outcome of a reachability check against the Ollama server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PingStatus {
    Reachable,
    ConnectionError(String),
    Timeout,
    HttpError(u16),
    Other(String),
}

impl PingStatus {
    pub fn is_reachable(&self) -> bool {
        matches!(self, PingStatus::Reachable)
    }
}

impl fmt::Display for PingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PingStatus::Reachable => write!(f, "Ollama is reachable"),
            PingStatus::ConnectionError(msg) => write!(f, "Cannot connect to Ollama: {}", msg),
            PingStatus::Timeout => write!(f, "Ollama did not answer in time"),
            PingStatus::HttpError(status) => write!(f, "Ollama returned HTTP {}", status),
            PingStatus::Other(msg) => write!(f, "Ollama check failed: {}", msg),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// Reachability and model listing for a local Ollama server.
pub struct LocalDiscovery;

impl LocalDiscovery {
    fn tags_url(base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), endpoints::TAGS_PATH)
    }

    /// Checks whether the server answers `/api/tags` within `timeout`.
    pub async fn ping(base_url: &str, timeout: Duration) -> PingStatus {
        let client = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(client) => client,
            Err(e) => return PingStatus::Other(e.to_string()),
        };

        let url = Self::tags_url(base_url);
        debug!(url = %url, "Pinging Ollama");
        let status = match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => PingStatus::Reachable,
            Ok(resp) => PingStatus::HttpError(resp.status().as_u16()),
            Err(e) if e.is_timeout() => PingStatus::Timeout,
            Err(e) if e.is_connect() => PingStatus::ConnectionError(e.to_string()),
            Err(e) => PingStatus::Other(e.to_string()),
        };
        if !status.is_reachable() {
            warn!(url = %url, status = %status, "Ollama ping failed");
        }
        status
    }

    /// Names of the models installed on the server.
    pub async fn list_models(base_url: &str, timeout: Duration) -> Result<Vec<String>> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let response = client.get(Self::tags_url(base_url)).send().await?;
        if !response.status().is_success() {
            return Err(ScreenerError::Config(format!(
                "Ollama returned HTTP {} when listing models",
                response.status().as_u16()
            )));
        }
        let body: TagsResponse = response.json().await?;
        Ok(body.models.into_iter().map(|m| m.name).collect())
    }

    /// True when `wanted` is installed, accepting a bare name for `name:tag`.
    pub fn has_model(installed: &[String], wanted: &str) -> bool {
        installed
            .iter()
            .any(|m| m == wanted || m.starts_with(&format!("{}:", wanted)))
    }
}
