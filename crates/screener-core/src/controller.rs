//! Single owner of the active session. Model requests run as tokio tasks and
//! report back over a channel; the owner applies a reply only while its tag
//! still matches the live session and the in-flight request.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::conversation::{AskOutcome, Conversation, TurnId};
use crate::error::{Result, ScreenerError};
use crate::llm::{ModelClient, ModelError};
use crate::session::{Session, SessionStore};

/// Identity of a dispatched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTag {
    /// Bumped whenever the active session is replaced or closed.
    pub generation: u64,
    pub turn: TurnId,
}

#[derive(Debug)]
pub struct ModelReply {
    pub tag: RequestTag,
    pub result: std::result::Result<String, ModelError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// The reply was stored on `turn`.
    Applied { turn: TurnId, answered: bool },
    /// The reply targeted a closed session or a superseded request.
    Stale,
}

pub struct SessionController {
    client: Arc<dyn ModelClient>,
    replies: mpsc::UnboundedSender<ModelReply>,
    session: Option<Session>,
    generation: u64,
    in_flight: Option<RequestTag>,
}

impl SessionController {
    /// Returns the controller and the receiver its requests report to.
    pub fn new(client: Arc<dyn ModelClient>) -> (Self, mpsc::UnboundedReceiver<ModelReply>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = Self {
            client,
            replies: tx,
            session: None,
            generation: 0,
            in_flight: None,
        };
        (controller, rx)
    }

    pub fn client(&self) -> &Arc<dyn ModelClient> {
        &self.client
    }

    /// Used for subsequent requests; an in-flight request keeps its client.
    pub fn set_client(&mut self, client: Arc<dyn ModelClient>) {
        info!(model = %client.model_name(), "Model client replaced");
        self.client = client;
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        self.session.as_ref().map(Session::conversation)
    }

    pub fn in_flight(&self) -> Option<RequestTag> {
        self.in_flight
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    fn replace_session(&mut self, session: Option<Session>) -> Option<Session> {
        self.generation += 1;
        if let Some(tag) = self.in_flight.take() {
            debug!(turn = %tag.turn, "Abandoning in-flight request");
        }
        std::mem::replace(&mut self.session, session)
    }

    /// Makes `session` active and requests the answer to its initial prompt.
    pub fn start(&mut self, session: Session) -> Result<RequestTag> {
        info!(session = %session.id(), "Activating new session");
        self.replace_session(Some(session));
        self.dispatch(TurnId::ROOT)
    }

    /// Makes a restored session active without sending anything.
    pub fn open(&mut self, session: Session) {
        info!(session = %session.id(), "Re-opened session");
        self.replace_session(Some(session));
    }

    /// Closes the active session; a reply still on its way will be discarded.
    pub fn close(&mut self) -> Option<Session> {
        self.replace_session(None)
    }

    fn session_mut(&mut self) -> Result<&mut Session> {
        self.session.as_mut().ok_or(ScreenerError::NoActiveSession)
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.session.is_none() {
            return Err(ScreenerError::NoActiveSession);
        }
        match self.in_flight {
            Some(tag) => Err(ScreenerError::RequestInFlight(tag.turn)),
            None => Ok(()),
        }
    }

    fn dispatch(&mut self, turn: TurnId) -> Result<RequestTag> {
        let model = self.client.model_name().to_string();
        let session = self.session_mut()?;
        let request = session.request_for(turn)?;
        session.set_model(model.clone());

        let tag = RequestTag {
            generation: self.generation,
            turn,
        };
        let client = Arc::clone(&self.client);
        let replies = self.replies.clone();
        tokio::spawn(async move {
            let result = client.generate(&request).await;
            // The receiver is gone once the front end has shut down.
            let _ = replies.send(ModelReply { tag, result });
        });

        info!(turn = %turn, generation = tag.generation, model = %model, "Dispatched model request");
        self.in_flight = Some(tag);
        Ok(tag)
    }

    /// Asks from the current turn, sending a request unless the turn already
    /// has an answer. Rejected while another request is in flight.
    pub fn ask(&mut self, text: &str) -> Result<AskOutcome> {
        self.ensure_idle()?;
        let outcome = self.session_mut()?.conversation_mut().ask(text)?;
        if outcome.needs_answer {
            self.dispatch(outcome.turn)?;
        }
        Ok(outcome)
    }

    pub fn edit_and_fork(&mut self, turn: TurnId, text: &str) -> Result<AskOutcome> {
        self.ensure_idle()?;
        let outcome = self
            .session_mut()?
            .conversation_mut()
            .edit_and_fork(turn, text)?;
        if outcome.needs_answer {
            self.dispatch(outcome.turn)?;
        }
        Ok(outcome)
    }

    /// Re-sends the current turn when it failed or never got an answer.
    /// `None` when the current turn is already answered.
    pub fn retry(&mut self) -> Result<Option<RequestTag>> {
        self.ensure_idle()?;
        let conversation = self.session_mut()?.conversation_mut();
        let current = conversation.current_id();
        if !conversation.reopen(current)? {
            return Ok(None);
        }
        self.dispatch(current).map(Some)
    }

    pub fn go_back(&mut self) -> Result<TurnId> {
        Ok(self.session_mut()?.conversation_mut().go_back().id)
    }

    pub fn go_forward(&mut self) -> Result<TurnId> {
        Ok(self.session_mut()?.conversation_mut().go_forward().id)
    }

    pub fn select(&mut self, turn: TurnId) -> Result<TurnId> {
        Ok(self.session_mut()?.conversation_mut().select(turn)?.id)
    }

    /// Stores a reply if it belongs to the live request, otherwise drops it.
    pub fn apply_reply(&mut self, reply: ModelReply) -> ReplyOutcome {
        if reply.tag.generation != self.generation || self.in_flight != Some(reply.tag) {
            warn!(
                turn = %reply.tag.turn,
                generation = reply.tag.generation,
                live_generation = self.generation,
                "Discarding stale model reply"
            );
            return ReplyOutcome::Stale;
        }
        self.in_flight = None;

        let Some(session) = self.session.as_mut() else {
            return ReplyOutcome::Stale;
        };
        match session
            .conversation_mut()
            .resolve(reply.tag.turn, reply.result)
        {
            Ok(turn) => {
                let answered = turn.answer.is_answered();
                if let Some(err) = turn.answer.error() {
                    warn!(turn = %reply.tag.turn, error = %err, "Model request failed");
                }
                ReplyOutcome::Applied {
                    turn: reply.tag.turn,
                    answered,
                }
            }
            Err(e) => {
                warn!(error = %e, "Reply targets a turn that does not exist");
                ReplyOutcome::Stale
            }
        }
    }

    /// Waits until the in-flight request is applied. `None` when nothing is
    /// in flight or the channel closed.
    pub async fn wait_for_reply(
        &mut self,
        replies: &mut mpsc::UnboundedReceiver<ModelReply>,
    ) -> Option<ReplyOutcome> {
        while self.in_flight.is_some() {
            let reply = replies.recv().await?;
            let outcome = self.apply_reply(reply);
            if outcome != ReplyOutcome::Stale {
                return Some(outcome);
            }
        }
        None
    }

    /// Persists the active session.
    pub fn save(&self, store: &SessionStore) -> Result<PathBuf> {
        let session = self.session.as_ref().ok_or(ScreenerError::NoActiveSession)?;
        store.save(session)
    }
}
