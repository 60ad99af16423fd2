use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

use super::traits::{GenerateRequest, ModelClient, ModelError};
use crate::config::Settings;
use crate::constants::{defaults, endpoints, models};

/// Client for a local Ollama server's `/api/generate` endpoint.
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: endpoints::OLLAMA_BASE_URL.to_string(),
            model: model.into(),
            timeout: Duration::from_secs(defaults::TIMEOUT_SECS),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.ollama.model.clone())
            .with_base_url(settings.ollama.base_url.clone())
            .with_timeout(settings.request_timeout())
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn classify(&self, err: reqwest::Error) -> ModelError {
        if err.is_timeout() {
            ModelError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else if err.is_connect() {
            ModelError::Unreachable {
                message: format!("{} ({})", self.base_url, err),
            }
        } else {
            ModelError::Interrupted {
                message: err.to_string(),
            }
        }
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new(models::DEFAULT_MODEL)
    }
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    images: Vec<String>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: Option<String>,
    error: Option<String>,
}

/// Turns a status code and raw body into either the answer text or a model error.
fn interpret(status: u16, body: &str) -> Result<String, ModelError> {
    let parsed = serde_json::from_str::<GenerateResponse>(body);

    if !(200..300).contains(&status) {
        let detail = parsed
            .ok()
            .and_then(|r| r.error)
            .unwrap_or_else(|| body.trim().to_string());
        return Err(ModelError::ServerError { status, detail });
    }

    let parsed = parsed.map_err(|e| ModelError::MalformedResponse {
        message: format!("invalid JSON: {}", e),
    })?;
    match (parsed.response, parsed.error) {
        (Some(text), _) => Ok(text),
        (None, Some(detail)) => Err(ModelError::ServerError { status, detail }),
        (None, None) => Err(ModelError::MalformedResponse {
            message: "response contains neither 'response' nor 'error'".into(),
        }),
    }
}

#[async_trait::async_trait]
impl ModelClient for OllamaClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, ModelError> {
        let url = format!("{}{}", self.base_url, endpoints::GENERATE_PATH);
        let prompt = request.prompt();
        let body = GenerateBody {
            model: &self.model,
            prompt: &prompt,
            images: vec![request.image.to_base64()],
            stream: false,
        };

        info!(
            url = %url,
            model = %self.model,
            timeout_secs = self.timeout.as_secs(),
            follow_up = request.question.is_some(),
            "Sending Ollama request"
        );

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| self.classify(e))?;
        debug!(status, bytes = text.len(), "Ollama responded");

        let result = interpret(status, &text);
        match &result {
            Ok(answer) => info!(chars = answer.len(), "Ollama answer received"),
            Err(err) => error!(error = %err, "Ollama request failed"),
        }
        result
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_settings_uses_configured_endpoint_and_timeout() {
        let mut settings = Settings::default();
        settings.ollama.base_url = "http://gpu-box:11434/".into();
        settings.ollama.model = "llava:7b".into();
        settings.ollama.timeout_secs = 42;

        let client = OllamaClient::from_settings(&settings);
        assert_eq!(client.base_url(), "http://gpu-box:11434");
        assert_eq!(client.model_name(), "llava:7b");
        assert_eq!(client.timeout(), settings.request_timeout());
        assert_eq!(client.timeout().as_secs(), 42);
    }

    #[test]
    fn test_interpret_success() {
        let body = r#"{"model":"gemma3:4b","response":"A cat","done":true}"#;
        assert_eq!(interpret(200, body).unwrap(), "A cat");
    }

    #[test]
    fn test_interpret_error_status_prefers_json_error() {
        let err = interpret(404, r#"{"error":"model 'x' not found"}"#).unwrap_err();
        assert_eq!(
            err,
            ModelError::ServerError {
                status: 404,
                detail: "model 'x' not found".into()
            }
        );

        let err = interpret(502, "bad gateway\n").unwrap_err();
        assert_eq!(
            err,
            ModelError::ServerError {
                status: 502,
                detail: "bad gateway".into()
            }
        );
    }

    #[test]
    fn test_interpret_error_field_on_ok_status() {
        let err = interpret(200, r#"{"error":"image too large"}"#).unwrap_err();
        assert!(matches!(err, ModelError::ServerError { status: 200, .. }));
    }

    #[test]
    fn test_interpret_malformed() {
        assert!(matches!(
            interpret(200, r#"{"done":true}"#),
            Err(ModelError::MalformedResponse { .. })
        ));
        assert!(matches!(
            interpret(200, "not json"),
            Err(ModelError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = OllamaClient::default().with_base_url("http://host:11434/");
        assert_eq!(client.base_url(), "http://host:11434");
        assert_eq!(client.model_name(), models::DEFAULT_MODEL);
    }
}
