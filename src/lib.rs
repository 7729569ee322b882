pub mod analysis;
pub mod conversion;
pub mod db;
pub mod llm;
pub mod session;
pub mod settings;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

use analysis::AnalysisService;
use conversion::ConversionCache;
use llm::CompletionClient;
use session::relay::ChatRelay;
use session::seeder::ChatSessionSeeder;
use session::ChatSession;
use settings::ChatSettings;
use std::sync::Arc;
use store::{ArtifactStore, DocumentSource};

/// Shared collaborators from which per-document sessions are opened
pub struct DocChat {
    settings: ChatSettings,
    cache: Arc<ConversionCache>,
    client: Arc<dyn CompletionClient>,
}

impl DocChat {
    pub fn new(
        settings: ChatSettings,
        store: Arc<dyn ArtifactStore>,
        documents: Arc<dyn DocumentSource>,
        analyzer: Arc<dyn AnalysisService>,
        client: Arc<dyn CompletionClient>,
    ) -> Self {
        let cache = Arc::new(ConversionCache::new(
            store,
            documents,
            analyzer,
            settings.page_range.clone(),
        ));
        Self {
            settings,
            cache,
            client,
        }
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    /// Each call yields an independent session with fresh state.
    pub fn open_session(&self, document: impl Into<String>) -> ChatSession {
        ChatSession::new(
            document,
            self.cache.clone(),
            ChatSessionSeeder::from_settings(&self.settings),
            ChatRelay::new(self.client.clone(), self.settings.generation.clone()),
        )
    }
}
