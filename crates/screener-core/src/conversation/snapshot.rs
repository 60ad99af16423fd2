use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tree::Conversation;
use super::turn::{Turn, TurnId};
use crate::capture::ImageRef;
use crate::constants::storage::SNAPSHOT_VERSION;
use crate::error::{Result, ScreenerError};

/// Flat, order-preserving copy of a conversation, as written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub image: ImageRef,
    pub current: TurnId,
    pub turns: Vec<Turn>,
}

impl Conversation {
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            version: SNAPSHOT_VERSION,
            image: self.image().clone(),
            current: self.current_id(),
            turns: self.turns().to_vec(),
        }
    }

    /// Rebuilds a conversation, rejecting any snapshot whose tree is
    /// inconsistent. Nothing is returned unless every check passes.
    pub fn restore(snapshot: Snapshot) -> Result<Self> {
        validate(&snapshot)?;
        debug!(turns = snapshot.turns.len(), current = %snapshot.current, "Restored conversation");
        Ok(Conversation::from_parts(
            snapshot.turns,
            snapshot.current,
            snapshot.image,
        ))
    }
}

fn validate(snapshot: &Snapshot) -> Result<()> {
    if snapshot.version > SNAPSHOT_VERSION {
        return Err(ScreenerError::corrupt(format!(
            "snapshot version {} is newer than supported version {}",
            snapshot.version, SNAPSHOT_VERSION
        )));
    }
    if snapshot.turns.is_empty() {
        return Err(ScreenerError::corrupt("snapshot has no turns"));
    }

    for (index, turn) in snapshot.turns.iter().enumerate() {
        if turn.id.index() != index {
            return Err(ScreenerError::corrupt(format!(
                "turn at position {} has id {}",
                index, turn.id
            )));
        }
        match turn.parent {
            None if index == 0 => {}
            None => {
                return Err(ScreenerError::corrupt(format!(
                    "turn {} has no parent but is not the root",
                    turn.id
                )));
            }
            Some(parent) if index == 0 => {
                return Err(ScreenerError::corrupt(format!(
                    "root turn references parent {}",
                    parent
                )));
            }
            // Parents are always created first, which also rules out cycles.
            Some(parent) if parent.index() >= index => {
                return Err(ScreenerError::corrupt(format!(
                    "turn {} references parent {} that does not precede it",
                    turn.id, parent
                )));
            }
            Some(_) => {}
        }
    }

    let mut seen = std::collections::HashSet::new();
    for turn in &snapshot.turns {
        if let Some(parent) = turn.parent {
            if !seen.insert((parent, turn.question.as_str())) {
                return Err(ScreenerError::corrupt(format!(
                    "turn {} duplicates a sibling question",
                    turn.id
                )));
            }
        }
    }

    if snapshot.current.index() >= snapshot.turns.len() {
        return Err(ScreenerError::corrupt(format!(
            "current turn {} is outside the tree",
            snapshot.current
        )));
    }
    Ok(())
}
