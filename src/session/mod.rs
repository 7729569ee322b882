//! Per-document chat session
//!
//! A `ChatSession` owns its conversion state, conversation and display
//! history. Hosts observe state through [`ChatSession::subscribe`] or
//! [`ChatSession::view`] and dispatch turns through [`ChatSession::submit`].

pub mod relay;
pub mod seeder;
pub mod state;

use crate::conversion::ConversionCache;
use crate::llm::{ChatMessage, Role};
use relay::{ChatRelay, TurnError};
use seeder::ChatSessionSeeder;
use serde::{Deserialize, Serialize};
use state::{ConversionEvent, ConversionState, ConversionStateMachine, TransitionError};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DisplayRole {
    User,
    Ai,
}

/// UI-facing mirror of a conversation turn
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DisplayMessage {
    pub role: DisplayRole,
    pub text: String,
}

impl DisplayMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: DisplayRole::User,
            text: text.into(),
        }
    }

    pub fn ai(text: impl Into<String>) -> Self {
        Self {
            role: DisplayRole::Ai,
            text: text.into(),
        }
    }

    pub fn to_chat(&self) -> ChatMessage {
        match self.role {
            DisplayRole::User => ChatMessage::user(self.text.clone()),
            DisplayRole::Ai => ChatMessage::assistant(self.text.clone()),
        }
    }
}

/// Endpoint-facing history. Starts with exactly one system message and only grows.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::system(system_prompt)],
        }
    }

    pub(crate) fn push(&mut self, message: ChatMessage) {
        debug_assert_ne!(message.role, Role::System);
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// What the host should render for the current state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionView {
    Hidden,
    Progress,
    Error(String),
    Chat,
}

impl From<&ConversionState> for SessionView {
    fn from(state: &ConversionState) -> Self {
        match state {
            ConversionState::Idle => SessionView::Hidden,
            ConversionState::Converting => SessionView::Progress,
            ConversionState::Failed(reason) => SessionView::Error(reason.clone()),
            ConversionState::Ready => SessionView::Chat,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("Session closed")]
    Closed,
}

/// Closes a session from outside the task driving it
#[derive(Debug, Clone)]
pub struct SessionCloser {
    token: CancellationToken,
}

impl SessionCloser {
    pub fn close(&self) {
        self.token.cancel();
    }
}

type CloseCallback = Box<dyn FnOnce() + Send + Sync>;

pub struct ChatSession {
    id: Uuid,
    document: String,
    cache: Arc<ConversionCache>,
    seeder: ChatSessionSeeder,
    relay: ChatRelay,
    state: ConversionStateMachine,
    conversation: Option<Conversation>,
    display: Vec<DisplayMessage>,
    cancel: CancellationToken,
    on_close: Option<CloseCallback>,
}

impl ChatSession {
    pub fn new(
        document: impl Into<String>,
        cache: Arc<ConversionCache>,
        seeder: ChatSessionSeeder,
        relay: ChatRelay,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            document: document.into(),
            cache,
            seeder,
            relay,
            state: ConversionStateMachine::new(),
            conversation: None,
            display: Vec::new(),
            cancel: CancellationToken::new(),
            on_close: None,
        }
    }

    /// Callback run inline on every state transition
    pub fn on_state_change(
        mut self,
        callback: impl Fn(&ConversionState) + Send + Sync + 'static,
    ) -> Self {
        self.state.observe(callback);
        self
    }

    /// Callback run when the host closes the session
    pub fn on_close(mut self, callback: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Box::new(callback));
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn state(&self) -> ConversionState {
        self.state.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversionState> {
        self.state.subscribe()
    }

    pub fn view(&self) -> SessionView {
        SessionView::from(&self.state())
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        self.conversation.as_ref()
    }

    pub fn display(&self) -> &[DisplayMessage] {
        &self.display
    }

    pub fn closer(&self) -> SessionCloser {
        SessionCloser {
            token: self.cancel.clone(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn ensure_live(&self) -> Result<(), SessionError> {
        if self.cancel.is_cancelled() {
            tracing::debug!(session = %self.id, "Discarding result for closed session");
            return Err(SessionError::Closed);
        }
        Ok(())
    }

    /// Resolve the document's artifact and seed the conversation.
    ///
    /// Conversion failures do not error: they move the session to `Failed`,
    /// which is returned. A started session cannot be started again.
    pub async fn start(&mut self) -> Result<ConversionState, SessionError> {
        let current = self.state();
        if current != ConversionState::Idle {
            return Err(TransitionError {
                from: current,
                event: ConversionEvent::ConversionStarted,
            }
            .into());
        }
        tracing::info!(session = %self.id, document = %self.document, "Starting chat session");

        let lookup = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(SessionError::Closed),
            lookup = self.cache.cached(&self.document) => lookup,
        };
        self.ensure_live()?;

        let artifact = match lookup {
            Ok(Some(artifact)) => artifact,
            Ok(None) => {
                self.state.apply(ConversionEvent::ConversionStarted)?;

                // Detached so an abandoned conversion still finishes and caches its artifact.
                let cache = self.cache.clone();
                let document = self.document.clone();
                let task = tokio::spawn(async move { cache.create(&document).await });

                let joined = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(SessionError::Closed),
                    joined = task => joined,
                };
                self.ensure_live()?;

                match joined {
                    Ok(Ok(artifact)) => artifact,
                    Ok(Err(e)) => return self.fail(e.to_string()),
                    Err(e) => return self.fail(format!("Conversion task failed: {}", e)),
                }
            }
            Err(e) => return self.fail(e.to_string()),
        };

        let seeded = self.seeder.seed(&artifact);
        self.conversation = Some(seeded.conversation);
        self.display = seeded.display;
        Ok(self.state.apply(ConversionEvent::ArtifactReady)?)
    }

    fn fail(&mut self, reason: String) -> Result<ConversionState, SessionError> {
        tracing::warn!(session = %self.id, %reason, "Document conversion failed");
        Ok(self.state.apply(ConversionEvent::ConversionFailed(reason))?)
    }

    /// Relay new turns. Only one relay can run at a time per session.
    pub async fn relay(&mut self, incoming: Vec<DisplayMessage>) -> Result<String, TurnError> {
        if self.cancel.is_cancelled() {
            return Err(TurnError::Closed);
        }
        let state = self.state();
        if state != ConversionState::Ready {
            return Err(TurnError::Unavailable(state));
        }
        let Some(conversation) = self.conversation.as_mut() else {
            return Err(TurnError::Unavailable(state));
        };

        self.relay
            .relay(conversation, &mut self.display, incoming, &self.cancel)
            .await
    }

    /// Submit one user turn
    pub async fn submit(&mut self, text: impl Into<String>) -> Result<String, TurnError> {
        self.relay(vec![DisplayMessage::user(text)]).await
    }

    /// Tear the session down and notify the host.
    pub fn close(mut self) {
        self.cancel.cancel();
        if let Some(callback) = self.on_close.take() {
            callback();
        }
        tracing::info!(session = %self.id, "Chat session closed");
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
