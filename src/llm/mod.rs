pub mod azure;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Value of `finish_reason` for a completion that ended normally
pub const FINISH_STOP: &str = "stop";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Request body for the completion endpoint
#[derive(Debug, Serialize, Clone)]
pub struct CompletionRequest {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    /// Always serialized, `null` when unset.
    pub stop: Option<Vec<String>>,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Choice {
    pub finish_reason: Option<String>,
    pub message: Option<ResponseMessage>,
}

/// Reply message as received. Filtered completions may carry no content.
#[derive(Debug, Deserialize, Clone)]
pub struct ResponseMessage {
    pub role: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: String,
    /// String or numeric depending on the deployment
    #[serde(default)]
    pub code: Option<serde_json::Value>,
}

impl ApiErrorBody {
    /// Text shown for the error, never empty
    pub fn describe(&self) -> String {
        if !self.message.trim().is_empty() {
            return self.message.clone();
        }
        match &self.code {
            Some(serde_json::Value::String(code)) if !code.is_empty() => {
                format!("API error {}", code)
            }
            Some(serde_json::Value::Number(code)) => format!("API error {}", code),
            _ => "Unknown API error".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Parse error: {0}")]
    Parse(String),
}

impl Serialize for LlmError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Remote completion endpoint
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError>;
}
