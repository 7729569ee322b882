use super::{AnalysisError, AnalysisService, AnalyzeResult, DocumentBlob};
use async_trait::async_trait;

/// In-process analyzer for text, markdown and PDF documents.
///
/// The page range is not applied: every page of the document is extracted.
#[derive(Debug, Clone, Default)]
pub struct LocalAnalyzer;

fn decode_text(bytes: &[u8]) -> Result<String, AnalysisError> {
    String::from_utf8(bytes.to_vec()).map_err(|e| AnalysisError::Parse(e.to_string()))
}

/// Parse a document into per-page plain text
pub fn parse_pages(document: &DocumentBlob) -> Result<Vec<String>, AnalysisError> {
    let ext = document.extension();

    match ext.as_str() {
        "txt" | "md" | "markdown" => {
            let content = decode_text(&document.bytes)?;
            if content.trim().is_empty() {
                Ok(vec![])
            } else {
                Ok(vec![content])
            }
        }
        "pdf" => pdf_extract::extract_text_from_mem_by_pages(&document.bytes)
            .map_err(|e| AnalysisError::Parse(format!("PDF parse error: {}", e))),
        _ => Err(AnalysisError::Unsupported(ext)),
    }
}

#[async_trait]
impl AnalysisService for LocalAnalyzer {
    async fn analyze(
        &self,
        document: &DocumentBlob,
        _page_range: &str,
    ) -> Result<AnalyzeResult, AnalysisError> {
        let document = document.clone();
        // PDF extraction is CPU bound.
        let pages = tokio::task::spawn_blocking(move || parse_pages(&document))
            .await
            .map_err(|e| AnalysisError::Failed(e.to_string()))??;
        Ok(AnalyzeResult::from_pages(pages))
    }
}
