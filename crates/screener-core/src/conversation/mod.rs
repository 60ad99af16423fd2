pub mod snapshot;
pub mod tree;
pub mod turn;

pub use snapshot::Snapshot;
pub use tree::{AskOutcome, Conversation};
pub use turn::{Answer, Turn, TurnId};
