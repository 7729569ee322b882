use super::{CompletionClient, CompletionRequest, CompletionResponse, LlmError};
use async_trait::async_trait;
use reqwest::Client;

#[derive(Debug, Clone)]
pub struct AzureConfig {
    pub api_key: String,
    /// Full deployment URL, including `api-version`
    pub endpoint: String,
}

/// Azure OpenAI chat completions client
pub struct AzureChatClient {
    client: Client,
    config: AzureConfig,
}

impl AzureChatClient {
    pub fn new(config: AzureConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

/// Decode a completion body. Error payloads share the success shape, so the
/// HTTP status is not consulted.
pub fn parse_completion(body: &str) -> Result<CompletionResponse, LlmError> {
    serde_json::from_str(body).map_err(|e| LlmError::Parse(e.to_string()))
}

#[async_trait]
impl CompletionClient for AzureChatClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let resp = self
            .client
            .post(&self.config.endpoint)
            .header("api-key", &self.config.api_key)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = resp.status().as_u16();
        let text = resp.text().await?;
        tracing::debug!(status, bytes = text.len(), "Completion response received");
        parse_completion(&text)
    }
}
