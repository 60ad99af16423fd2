use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::llm::ModelError;

/// Index of a turn in its conversation arena. Ids follow creation order and
/// are never reused, so a larger id always means a newer turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(pub usize);

impl TurnId {
    pub const ROOT: TurnId = TurnId(0);

    pub fn index(self) -> usize {
        self.0
    }

    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// State of a turn's answer. A turn moves from `Pending` to one of the other
/// two states in a single assignment, never through a partial answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Answer {
    Pending,
    Answered(String),
    Failed(ModelError),
}

impl Answer {
    pub fn is_pending(&self) -> bool {
        matches!(self, Answer::Pending)
    }

    pub fn is_answered(&self) -> bool {
        matches!(self, Answer::Answered(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Answer::Failed(_))
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Answer::Answered(text) => Some(text),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ModelError> {
        match self {
            Answer::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// One question/answer exchange in the conversation tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub id: TurnId,
    /// `None` only for the root turn.
    pub parent: Option<TurnId>,
    /// Empty for the root turn, whose prompt is the session's initial prompt.
    pub question: String,
    pub answer: Answer,
    pub asked_at: DateTime<Utc>,
}

impl Turn {
    pub(crate) fn root() -> Self {
        Self {
            id: TurnId::ROOT,
            parent: None,
            question: String::new(),
            answer: Answer::Pending,
            asked_at: Utc::now(),
        }
    }

    pub(crate) fn child(id: TurnId, parent: TurnId, question: String) -> Self {
        Self {
            id,
            parent: Some(parent),
            question,
            answer: Answer::Pending,
            asked_at: Utc::now(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_serializes_with_state_tag() {
        let pending = serde_json::to_value(Answer::Pending).unwrap();
        assert_eq!(pending, serde_json::json!({ "state": "pending" }));

        let answered = serde_json::to_value(Answer::Answered("a cat".into())).unwrap();
        assert_eq!(answered["state"], "answered");
        assert_eq!(answered["value"], "a cat");

        let failed = serde_json::to_value(Answer::Failed(ModelError::Timeout { seconds: 5 })).unwrap();
        assert_eq!(failed["state"], "failed");
        assert_eq!(failed["value"]["kind"], "timeout");
    }

    #[test]
    fn test_turn_id_display_and_order() {
        assert_eq!(TurnId(3).to_string(), "#3");
        assert!(TurnId(4) > TurnId(3));
        assert!(TurnId::ROOT.is_root());
    }
}
