use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::capture::CapturedImage;

/// Failure of a single model request. Stored on the affected turn, so it is
/// plain data rather than a wrapped source error.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelError {
    #[error("request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("model server unreachable: {message}")]
    Unreachable { message: String },

    #[error("model server returned {status}: {detail}")]
    ServerError { status: u16, detail: String },

    #[error("malformed response: {message}")]
    MalformedResponse { message: String },

    #[error("request interrupted: {message}")]
    Interrupted { message: String },
}

/// One earlier question/answer pair on the path to the turn being asked.
/// The root exchange has an empty question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub question: String,
    pub answer: Option<String>,
}

/// Everything a model needs to answer one turn.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub image: Arc<CapturedImage>,
    pub initial_prompt: String,
    /// Exchanges from the root down to the parent of the asked turn.
    pub history: Vec<Exchange>,
    /// `None` when asking the root turn.
    pub question: Option<String>,
}

impl GenerateRequest {
    pub fn initial(image: Arc<CapturedImage>, initial_prompt: impl Into<String>) -> Self {
        Self {
            image,
            initial_prompt: initial_prompt.into(),
            history: Vec::new(),
            question: None,
        }
    }

    /// The prompt text sent alongside the image.
    pub fn prompt(&self) -> String {
        match &self.question {
            None => self.initial_prompt.clone(),
            Some(question) => super::prompt::composite(&self.initial_prompt, &self.history, question),
        }
    }
}

/// Image-conditioned text generation.
#[async_trait::async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, ModelError>;

    fn model_name(&self) -> &str;
}
