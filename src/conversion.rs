//! Get-or-create cache mapping a document to its extracted text artifact.
//!
//! Once an artifact exists in the store, the analysis service is never called
//! again for that document. Two callers racing on the same document may both
//! analyze and both write; each write is atomic and the content is derived
//! from the same source, so the last writer wins harmlessly.

use crate::analysis::{AnalysisError, AnalysisService, DocumentBlob};
use crate::store::{artifact_path, is_artifact, ArtifactStore, DocumentSource, StoreError};
use serde::Serialize;
use std::sync::Arc;

/// Plain text extracted from a document, and where it is stored
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextArtifact {
    pub path: String,
    pub content: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("The document was not found: {0}")]
    DocumentNotFound(String),
    #[error("Storage unavailable: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error("No pages were extracted from the document")]
    NoPages,
    #[error("No text was extracted from the document")]
    NoText,
    #[error("The document is not valid UTF-8 text: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error("Error saving the text file {path}: {source}")]
    Persistence { path: String, source: StoreError },
}

impl Serialize for CacheError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub struct ConversionCache {
    store: Arc<dyn ArtifactStore>,
    documents: Arc<dyn DocumentSource>,
    analyzer: Arc<dyn AnalysisService>,
    page_range: String,
}

impl ConversionCache {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        documents: Arc<dyn DocumentSource>,
        analyzer: Arc<dyn AnalysisService>,
        page_range: impl Into<String>,
    ) -> Self {
        Self {
            store,
            documents,
            analyzer,
            page_range: page_range.into(),
        }
    }

    /// Look up an existing artifact without converting anything.
    pub async fn cached(&self, document_path: &str) -> Result<Option<TextArtifact>, ConversionError> {
        let path = artifact_path(document_path);

        if is_artifact(document_path) {
            // Already text: read directly, it cannot be produced by conversion.
            if let Some(content) = self.store.read(&path).await? {
                return Ok(Some(TextArtifact { path, content }));
            }
            let bytes = self
                .documents
                .read_document(document_path)
                .await?
                .ok_or_else(|| ConversionError::DocumentNotFound(document_path.to_string()))?;
            let content = String::from_utf8(bytes)?;
            return Ok(Some(TextArtifact { path, content }));
        }

        if !self.store.exists(&path).await? {
            tracing::debug!(%path, "Artifact cache miss");
            return Ok(None);
        }

        match self.store.read(&path).await? {
            Some(content) => {
                tracing::debug!(%path, "Artifact cache hit");
                Ok(Some(TextArtifact { path, content }))
            }
            None => Ok(None),
        }
    }

    /// Analyze the document and persist its text. Nothing is stored on failure.
    pub async fn create(&self, document_path: &str) -> Result<TextArtifact, CacheError> {
        let path = artifact_path(document_path);

        let bytes = self
            .documents
            .read_document(document_path)
            .await
            .map_err(ConversionError::from)?
            .ok_or_else(|| ConversionError::DocumentNotFound(document_path.to_string()))?;
        let blob = DocumentBlob {
            path: document_path.to_string(),
            bytes,
        };

        tracing::info!(document = document_path, "Converting document to text");
        let result = self
            .analyzer
            .analyze(&blob, &self.page_range)
            .await
            .map_err(ConversionError::from)?;

        if result.pages.is_empty() {
            return Err(ConversionError::NoPages.into());
        }
        if result.content.trim().is_empty() {
            return Err(ConversionError::NoText.into());
        }
        tracing::info!(pages = result.pages.len(), "Document analyzed");

        self.store
            .write(&path, &result.content)
            .await
            .map_err(|source| CacheError::Persistence {
                path: path.clone(),
                source,
            })?;

        Ok(TextArtifact {
            path,
            content: result.content,
        })
    }

    pub async fn get_or_create(&self, document_path: &str) -> Result<TextArtifact, CacheError> {
        match self.cached(document_path).await? {
            Some(artifact) => Ok(artifact),
            None => self.create(document_path).await,
        }
    }
}
