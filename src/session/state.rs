//! Conversion readiness of a session
//!
//! Idle → Converting → Ready | Failed, or Idle → Ready when the artifact is
//! already cached. Ready and Failed are terminal; a new session gets a new
//! machine.

use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ConversionState {
    Idle,
    Converting,
    Ready,
    Failed(String),
}

#[derive(Debug, Clone)]
pub enum ConversionEvent {
    /// No artifact cached, conversion task started
    ConversionStarted,
    /// Artifact available, either cached or freshly converted
    ArtifactReady,
    /// Lookup or conversion failed
    ConversionFailed(String),
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid transition from {from:?} on {event:?}")]
pub struct TransitionError {
    pub from: ConversionState,
    pub event: ConversionEvent,
}

/// Pure transition function
pub fn transition(
    state: &ConversionState,
    event: ConversionEvent,
) -> Result<ConversionState, TransitionError> {
    match (state, event) {
        (ConversionState::Idle, ConversionEvent::ConversionStarted) => Ok(ConversionState::Converting),
        (ConversionState::Idle | ConversionState::Converting, ConversionEvent::ArtifactReady) => {
            Ok(ConversionState::Ready)
        }
        (ConversionState::Idle | ConversionState::Converting, ConversionEvent::ConversionFailed(reason)) => {
            Ok(ConversionState::Failed(reason))
        }
        (from, event) => Err(TransitionError {
            from: from.clone(),
            event,
        }),
    }
}

type StateObserver = Box<dyn Fn(&ConversionState) + Send + Sync>;

/// Holds the current state and publishes every change to subscribers.
///
/// Watch subscribers only see the latest state; observers are called inline
/// for every transition, so none is missed.
pub struct ConversionStateMachine {
    tx: watch::Sender<ConversionState>,
    observers: Vec<StateObserver>,
}

impl ConversionStateMachine {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConversionState::Idle);
        Self {
            tx,
            observers: Vec::new(),
        }
    }

    pub fn observe(&mut self, observer: impl Fn(&ConversionState) + Send + Sync + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn state(&self) -> ConversionState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversionState> {
        self.tx.subscribe()
    }

    pub fn apply(&self, event: ConversionEvent) -> Result<ConversionState, TransitionError> {
        let current = self.state();
        let next = transition(&current, event)?;
        tracing::info!(from = ?current, to = ?next, "Conversion state changed");
        self.tx.send_replace(next.clone());
        for observer in &self.observers {
            observer(&next);
        }
        Ok(next)
    }
}

impl Default for ConversionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
