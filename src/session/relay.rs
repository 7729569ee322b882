use super::state::ConversionState;
use super::{Conversation, DisplayMessage};
use crate::llm::{
    ChatMessage, CompletionClient, CompletionRequest, CompletionResponse, LlmError, FINISH_STOP,
};
use crate::settings::GenerationParams;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Failure of a single chat turn. The session stays usable.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("Error: {0}")]
    Transport(#[from] LlmError),
    #[error("{0}")]
    Api(String),
    #[error("Error {0}")]
    FinishReason(String),
    #[error("Chat is unavailable while the session is {0:?}")]
    Unavailable(ConversionState),
    #[error("Session closed")]
    Closed,
    #[error("No message to send")]
    Empty,
}

impl Serialize for TurnError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Pick the assistant reply out of a completion response.
///
/// A structured error wins over choices; any finish reason other than
/// `stop` is rejected.
pub fn classify(response: CompletionResponse) -> Result<ChatMessage, TurnError> {
    if let Some(error) = response.error {
        return Err(TurnError::Api(error.describe()));
    }

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::Parse("response has no choices".into()))?;

    match choice.finish_reason.as_deref() {
        Some(FINISH_STOP) => {}
        Some(other) => return Err(TurnError::FinishReason(other.to_string())),
        None => return Err(TurnError::FinishReason("unknown".into())),
    }

    let message = choice
        .message
        .ok_or_else(|| LlmError::Parse("choice has no message".into()))?;
    tracing::debug!(role = message.role.as_deref().unwrap_or("none"), "Reply received");
    let content = message
        .content
        .ok_or_else(|| LlmError::Parse("choice has no message content".into()))?;
    Ok(ChatMessage::assistant(content))
}

/// Forwards user turns to the completion endpoint and reconciles replies into history
pub struct ChatRelay {
    client: Arc<dyn CompletionClient>,
    params: GenerationParams,
}

impl ChatRelay {
    pub fn new(client: Arc<dyn CompletionClient>, params: GenerationParams) -> Self {
        Self { client, params }
    }

    pub fn build_request(&self, conversation: &Conversation) -> CompletionRequest {
        CompletionRequest {
            max_tokens: self.params.max_tokens,
            temperature: self.params.temperature,
            top_p: self.params.top_p,
            stop: None,
            messages: conversation.messages().to_vec(),
        }
    }

    /// Relay new display messages and return the assistant's reply.
    ///
    /// The user turns stay in history whatever the outcome. The reply is
    /// appended only on success, and nothing is applied once `cancel` fires.
    /// A call without user turns is rejected before anything is sent.
    pub async fn relay(
        &self,
        conversation: &mut Conversation,
        display: &mut Vec<DisplayMessage>,
        incoming: Vec<DisplayMessage>,
        cancel: &CancellationToken,
    ) -> Result<String, TurnError> {
        if incoming.is_empty() {
            return Err(TurnError::Empty);
        }
        for message in incoming {
            conversation.push(message.to_chat());
            display.push(message);
        }

        let request = self.build_request(conversation);
        tracing::debug!(messages = request.messages.len(), "Sending completion request");

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TurnError::Closed),
            response = self.client.complete(&request) => response,
        };
        if cancel.is_cancelled() {
            return Err(TurnError::Closed);
        }

        let reply = match response.map_err(TurnError::from).and_then(classify) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "Chat turn failed");
                return Err(e);
            }
        };

        let text = reply.content.clone();
        conversation.push(reply);
        display.push(DisplayMessage::ai(text.clone()));
        tracing::info!(history = conversation.len(), "Chat turn completed");
        Ok(text)
    }
}
