use tracing::debug;

use super::turn::{Answer, Turn, TurnId};
use crate::capture::ImageRef;
use crate::error::{Result, ScreenerError};
use crate::llm::{Exchange, ModelError};

/// Result of `ask` / `edit_and_fork`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AskOutcome {
    pub turn: TurnId,
    /// False when an existing child with the same question was reused.
    pub created: bool,
    /// The turn has no answer yet and a model request should follow.
    pub needs_answer: bool,
}

/// Forkable question/answer history for one captured image.
///
/// Turns live in a flat arena indexed by [`TurnId`]; each turn stores its
/// parent id, so the tree serializes as a plain list. Turns are never removed
/// or re-parented, and `current` always points inside the arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    turns: Vec<Turn>,
    current: TurnId,
    image: ImageRef,
}

impl Conversation {
    /// A conversation with only the root turn, awaiting its answer.
    pub fn new(image: ImageRef) -> Self {
        Self {
            turns: vec![Turn::root()],
            current: TurnId::ROOT,
            image,
        }
    }

    /// Assembles a conversation from already validated parts.
    pub(crate) fn from_parts(turns: Vec<Turn>, current: TurnId, image: ImageRef) -> Self {
        Self {
            turns,
            current,
            image,
        }
    }

    pub fn image(&self) -> &ImageRef {
        &self.image
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn root(&self) -> &Turn {
        &self.turns[TurnId::ROOT.index()]
    }

    pub fn current(&self) -> &Turn {
        &self.turns[self.current.index()]
    }

    pub fn current_id(&self) -> TurnId {
        self.current
    }

    pub fn get(&self, id: TurnId) -> Option<&Turn> {
        self.turns.get(id.index())
    }

    pub fn turn(&self, id: TurnId) -> Result<&Turn> {
        self.get(id).ok_or(ScreenerError::UnknownTurn(id))
    }

    /// Children of `id` in creation order.
    pub fn children(&self, id: TurnId) -> impl Iterator<Item = &Turn> + '_ {
        self.turns.iter().filter(move |t| t.parent == Some(id))
    }

    pub fn newest_child(&self, id: TurnId) -> Option<TurnId> {
        self.children(id).map(|t| t.id).max()
    }

    /// All children of `id`'s parent, `id` included. The root is its own only sibling.
    pub fn siblings(&self, id: TurnId) -> Vec<&Turn> {
        match self.get(id) {
            Some(turn) => match turn.parent {
                Some(parent) => self.children(parent).collect(),
                None => vec![turn],
            },
            None => Vec::new(),
        }
    }

    /// Turns from the root down to `id`, both included. Empty for an unknown id.
    pub fn path_to(&self, id: TurnId) -> Vec<&Turn> {
        let mut path = Vec::new();
        let mut cursor = self.get(id);
        while let Some(turn) = cursor {
            path.push(turn);
            cursor = turn.parent.and_then(|p| self.get(p));
        }
        path.reverse();
        path
    }

    /// Path from the root to the current turn.
    pub fn active_path(&self) -> Vec<&Turn> {
        self.path_to(self.current)
    }

    /// Number of edges between the root and `id`.
    pub fn depth(&self, id: TurnId) -> usize {
        self.path_to(id).len().saturating_sub(1)
    }

    /// True when `id` is the current turn or one of its ancestors.
    pub fn is_on_active_path(&self, id: TurnId) -> bool {
        let mut cursor = Some(self.current);
        while let Some(turn_id) = cursor {
            if turn_id == id {
                return true;
            }
            cursor = self.get(turn_id).and_then(|t| t.parent);
        }
        false
    }

    fn find_child(&self, parent: TurnId, question: &str) -> Option<TurnId> {
        self.children(parent)
            .find(|t| t.question == question)
            .map(|t| t.id)
    }

    /// Asks `text` from the current turn.
    ///
    /// Reuses an existing child with the same question instead of adding a
    /// sibling. A reused child that failed or never got an answer goes back
    /// to `Pending` and reports `needs_answer`.
    pub fn ask(&mut self, text: &str) -> Result<AskOutcome> {
        self.ask_from(self.current, text)
    }

    /// Asks `text` as a new child of `turn_id`, which must be the current turn
    /// or one of its ancestors. Existing children of `turn_id` are kept; the
    /// new turn becomes its newest child and the current turn.
    pub fn edit_and_fork(&mut self, turn_id: TurnId, text: &str) -> Result<AskOutcome> {
        self.turn(turn_id)?;
        if !self.is_on_active_path(turn_id) {
            return Err(ScreenerError::NotOnActivePath(turn_id));
        }
        self.ask_from(turn_id, text)
    }

    fn ask_from(&mut self, parent: TurnId, text: &str) -> Result<AskOutcome> {
        let question = text.trim();
        if question.is_empty() {
            return Err(ScreenerError::EmptyQuestion);
        }

        if let Some(existing) = self.find_child(parent, question) {
            self.current = existing;
            let turn = &mut self.turns[existing.index()];
            let needs_answer = !turn.answer.is_answered();
            if needs_answer {
                turn.answer = Answer::Pending;
            }
            debug!(turn = %existing, needs_answer, "Re-asked existing turn");
            return Ok(AskOutcome {
                turn: existing,
                created: false,
                needs_answer,
            });
        }

        let id = TurnId(self.turns.len());
        self.turns
            .push(Turn::child(id, parent, question.to_string()));
        self.current = id;
        debug!(turn = %id, parent = %parent, "Appended turn");
        Ok(AskOutcome {
            turn: id,
            created: true,
            needs_answer: true,
        })
    }

    /// Moves to the parent of the current turn. No-op at the root.
    pub fn go_back(&mut self) -> &Turn {
        if let Some(parent) = self.current().parent {
            self.current = parent;
            debug!(turn = %parent, "Navigated back");
        }
        self.current()
    }

    /// Moves to the newest child of the current turn. No-op at a leaf.
    pub fn go_forward(&mut self) -> &Turn {
        if let Some(child) = self.newest_child(self.current) {
            self.current = child;
            debug!(turn = %child, "Navigated forward");
        }
        self.current()
    }

    /// Makes any existing turn current, e.g. to switch to a sibling branch.
    pub fn select(&mut self, id: TurnId) -> Result<&Turn> {
        self.turn(id)?;
        self.current = id;
        debug!(turn = %id, "Selected turn");
        Ok(self.current())
    }

    /// Puts an unanswered turn back to `Pending` so it can be re-sent.
    /// Returns false for a turn that already has an answer.
    pub fn reopen(&mut self, id: TurnId) -> Result<bool> {
        self.turn(id)?;
        let turn = &mut self.turns[id.index()];
        if turn.answer.is_answered() {
            return Ok(false);
        }
        turn.answer = Answer::Pending;
        Ok(true)
    }

    /// Stores a model result on `id` in one assignment.
    pub fn resolve(
        &mut self,
        id: TurnId,
        result: std::result::Result<String, ModelError>,
    ) -> Result<&Turn> {
        self.turn(id)?;
        let turn = &mut self.turns[id.index()];
        turn.answer = match result {
            Ok(text) => Answer::Answered(text),
            Err(err) => Answer::Failed(err),
        };
        Ok(&self.turns[id.index()])
    }

    /// Exchanges on the path from the root down to `id`, both included.
    pub fn exchanges_to(&self, id: TurnId) -> Vec<Exchange> {
        self.path_to(id)
            .into_iter()
            .map(|t| Exchange {
                question: t.question.clone(),
                answer: t.answer.text().map(str::to_string),
            })
            .collect()
    }

    /// Context sent along with a request for `id`: every exchange above it.
    pub fn context_for(&self, id: TurnId) -> Vec<Exchange> {
        match self.get(id).and_then(|t| t.parent) {
            Some(parent) => self.exchanges_to(parent),
            None => Vec::new(),
        }
    }
}
