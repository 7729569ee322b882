pub mod form_recognizer;
pub mod local;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Source document handed to an analyzer
#[derive(Debug, Clone)]
pub struct DocumentBlob {
    pub path: String,
    pub bytes: Vec<u8>,
}

impl DocumentBlob {
    pub fn extension(&self) -> String {
        std::path::Path::new(&self.path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub page_number: u32,
}

/// Extracted text plus the pages it came from
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AnalyzeResult {
    pub content: String,
    #[serde(default)]
    pub pages: Vec<Page>,
}

impl AnalyzeResult {
    pub fn from_pages(pages: Vec<String>) -> Self {
        let content = pages.join("\n");
        let pages = (1..=pages.len() as u32)
            .map(|page_number| Page { page_number })
            .collect();
        Self { content, pages }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Unsupported file type: .{0}")]
    Unsupported(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Analysis service error: {status} - {message}")]
    Service { status: u16, message: String },
    #[error("Analysis failed: {0}")]
    Failed(String),
    #[error("Analysis did not finish after {0} polls")]
    TimedOut(u32),
}

/// Converts a binary document into extracted text.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(
        &self,
        document: &DocumentBlob,
        page_range: &str,
    ) -> Result<AnalyzeResult, AnalysisError>;
}
