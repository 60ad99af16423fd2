pub mod error;
pub mod constants;
pub mod capture;
pub mod conversation;
pub mod llm;
pub mod session;
pub mod config;
pub mod controller;

// Re-export key types
pub use error::{Result, ScreenerError};
pub use capture::{CaptureOutcome, CaptureService, CapturedImage, CommandCapture, FileCapture, ImageRef, Region};
pub use conversation::{Answer, AskOutcome, Conversation, Snapshot, Turn, TurnId};
pub use llm::{Exchange, GenerateRequest, LocalDiscovery, ModelClient, ModelError, OllamaClient, PingStatus};
pub use session::{Session, SessionRecord, SessionStore, SessionSummary};
pub use config::{ActionPreset, Settings};
pub use controller::{ModelReply, ReplyOutcome, RequestTag, SessionController};
