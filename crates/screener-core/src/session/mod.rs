mod store;

pub use store::{SessionStore, SessionSummary};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::capture::CapturedImage;
use crate::constants::{defaults, storage};
use crate::conversation::{Conversation, Snapshot, TurnId};
use crate::error::{Result, ScreenerError};
use crate::llm::GenerateRequest;

/// One captured image with its conversation.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    initial_prompt: String,
    model: Option<String>,
    image: Arc<CapturedImage>,
    conversation: Conversation,
}

/// On-disk form of a session, stored as `conversation.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub saved_at: DateTime<Utc>,
    pub initial_prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    pub conversation: Snapshot,
}

impl Session {
    /// Starts a session with the default minimum selection size.
    pub fn start(image: CapturedImage, initial_prompt: &str) -> Result<Self> {
        Self::start_with_min_size(
            image,
            initial_prompt,
            defaults::MIN_SELECTION_WIDTH,
            defaults::MIN_SELECTION_HEIGHT,
        )
    }

    pub fn start_with_min_size(
        image: CapturedImage,
        initial_prompt: &str,
        min_width: u32,
        min_height: u32,
    ) -> Result<Self> {
        if image.width() < min_width.max(1) || image.height() < min_height.max(1) {
            return Err(ScreenerError::InvalidCapture(format!(
                "selection {}x{} is smaller than the minimum {}x{}",
                image.width(),
                image.height(),
                min_width,
                min_height
            )));
        }
        let initial_prompt = initial_prompt.trim();
        if initial_prompt.is_empty() {
            return Err(ScreenerError::EmptyQuestion);
        }

        let id = Self::generate_id(Local::now());
        let conversation = Conversation::new(image.image_ref(storage::SCREENSHOT_FILE));
        info!(session = %id, width = image.width(), height = image.height(), "Session started");
        Ok(Self {
            id,
            created_at: Utc::now(),
            initial_prompt: initial_prompt.to_string(),
            model: None,
            image: Arc::new(image),
            conversation,
        })
    }

    /// `YYYYMMDD_HHMMSS_xxxxxx`: capture time plus a random suffix.
    pub fn generate_id(at: DateTime<Local>) -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("{}_{}", at.format("%Y%m%d_%H%M%S"), &suffix[..6])
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn initial_prompt(&self) -> &str {
        &self.initial_prompt
    }

    /// Model that produced the most recent request, if any.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = Some(model.into());
    }

    pub fn image(&self) -> &Arc<CapturedImage> {
        &self.image
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn conversation_mut(&mut self) -> &mut Conversation {
        &mut self.conversation
    }

    /// Request answering `turn`: the initial prompt for the root, otherwise
    /// the turn's question with its ancestors as context.
    pub fn request_for(&self, turn: TurnId) -> Result<GenerateRequest> {
        let target = self.conversation.turn(turn)?;
        Ok(GenerateRequest {
            image: Arc::clone(&self.image),
            initial_prompt: self.initial_prompt.clone(),
            history: self.conversation.context_for(turn),
            question: (!target.is_root()).then(|| target.question.clone()),
        })
    }

    pub fn record(&self, saved_at: DateTime<Utc>) -> SessionRecord {
        SessionRecord {
            id: self.id.clone(),
            created_at: self.created_at,
            saved_at,
            initial_prompt: self.initial_prompt.clone(),
            model: self.model.clone(),
            conversation: self.conversation.snapshot(),
        }
    }

    /// Rebuilds a session from its record and decoded image. Either the whole
    /// session is returned or an error; nothing partial.
    pub fn from_record(record: SessionRecord, image: CapturedImage) -> Result<Self> {
        let image_ref = &record.conversation.image;
        if image_ref.width != image.width() || image_ref.height != image.height() {
            return Err(ScreenerError::corrupt(format!(
                "image is {}x{} but the conversation expects {}x{}",
                image.width(),
                image.height(),
                image_ref.width,
                image_ref.height
            )));
        }
        let conversation = Conversation::restore(record.conversation)?;
        Ok(Self {
            id: record.id,
            created_at: record.created_at,
            initial_prompt: record.initial_prompt,
            model: record.model,
            image: Arc::new(image),
            conversation,
        })
    }
}
