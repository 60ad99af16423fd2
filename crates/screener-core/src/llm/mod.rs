mod traits;
mod ollama;
pub mod discovery;
pub mod prompt;

pub use traits::*;
pub use ollama::OllamaClient;
pub use discovery::{LocalDiscovery, PingStatus};
