use thiserror::Error;

use crate::conversation::TurnId;

#[derive(Error, Debug)]
pub enum ScreenerError {
    #[error("Invalid capture: {0}")]
    InvalidCapture(String),

    #[error("Question is empty")]
    EmptyQuestion,

    #[error("Corrupt session: {0}")]
    CorruptSession(String),

    #[error("Turn {0} does not exist")]
    UnknownTurn(TurnId),

    #[error("Turn {0} is not on the path to the current turn")]
    NotOnActivePath(TurnId),

    #[error("A model request is already in flight for turn {0}")]
    RequestInFlight(TurnId),

    #[error("No active session")]
    NoActiveSession,

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl ScreenerError {
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptSession(message.into())
    }

    /// True for errors that reject a user action without touching any state.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::InvalidCapture(_)
                | Self::EmptyQuestion
                | Self::CorruptSession(_)
                | Self::UnknownTurn(_)
                | Self::NotOnActivePath(_)
                | Self::RequestInFlight(_)
                | Self::NoActiveSession
        )
    }
}

pub type Result<T> = std::result::Result<T, ScreenerError>;
