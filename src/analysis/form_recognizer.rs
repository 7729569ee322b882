use super::{AnalysisError, AnalysisService, AnalyzeResult, DocumentBlob};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const API_VERSION: &str = "2023-07-31";
const MODEL_ID: &str = "prebuilt-document";

#[derive(Debug, Clone)]
pub struct FormRecognizerConfig {
    pub api_key: String,
    pub endpoint: String,
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl FormRecognizerConfig {
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self {
            api_key,
            endpoint,
            poll_interval: Duration::from_secs(1),
            max_polls: 120,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    status: String,
    analyze_result: Option<AnalyzeResult>,
    error: Option<OperationError>,
}

#[derive(Deserialize)]
struct OperationError {
    message: String,
}

/// Remote analyzer backed by the Azure Document Intelligence REST API
pub struct FormRecognizer {
    client: Client,
    config: FormRecognizerConfig,
}

impl FormRecognizer {
    pub fn new(config: FormRecognizerConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn analyze_url(&self, page_range: &str) -> String {
        format!(
            "{}/formrecognizer/documentModels/{}:analyze?api-version={}&pages={}",
            self.config.endpoint.trim_end_matches('/'),
            MODEL_ID,
            API_VERSION,
            page_range
        )
    }

    async fn begin(&self, document: &DocumentBlob, page_range: &str) -> Result<String, AnalysisError> {
        let resp = self
            .client
            .post(self.analyze_url(page_range))
            .header("Ocp-Apim-Subscription-Key", &self.config.api_key)
            .header("Content-Type", "application/octet-stream")
            .body(document.bytes.clone())
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(AnalysisError::Service { status, message });
        }

        resp.headers()
            .get("Operation-Location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| AnalysisError::Parse("missing Operation-Location header".into()))
    }

    async fn poll(&self, operation_url: &str) -> Result<AnalyzeResult, AnalysisError> {
        for attempt in 0..self.config.max_polls {
            if attempt > 0 {
                tokio::time::sleep(self.config.poll_interval).await;
            }

            let resp = self
                .client
                .get(operation_url)
                .header("Ocp-Apim-Subscription-Key", &self.config.api_key)
                .send()
                .await?;

            if !resp.status().is_success() {
                let status = resp.status().as_u16();
                let message = resp.text().await.unwrap_or_default();
                return Err(AnalysisError::Service { status, message });
            }

            let op: OperationResponse = resp.json().await?;
            tracing::debug!(status = %op.status, attempt, "Polled analysis operation");
            match op.status.as_str() {
                "succeeded" => {
                    return op
                        .analyze_result
                        .ok_or_else(|| AnalysisError::Parse("missing analyzeResult".into()));
                }
                "failed" => {
                    let message = op
                        .error
                        .map(|e| e.message)
                        .unwrap_or_else(|| "unknown error".into());
                    return Err(AnalysisError::Failed(message));
                }
                _ => {}
            }
        }
        Err(AnalysisError::TimedOut(self.config.max_polls))
    }
}

#[async_trait]
impl AnalysisService for FormRecognizer {
    async fn analyze(
        &self,
        document: &DocumentBlob,
        page_range: &str,
    ) -> Result<AnalyzeResult, AnalysisError> {
        tracing::info!(path = %document.path, page_range, "Submitting document for analysis");
        let operation_url = self.begin(document, page_range).await?;
        self.poll(&operation_url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{HttpStub, StubResponse};

    fn recognizer(stub: &HttpStub, max_polls: u32) -> FormRecognizer {
        FormRecognizer::new(FormRecognizerConfig {
            api_key: "forms-key".into(),
            endpoint: stub.url(""),
            poll_interval: Duration::from_millis(1),
            max_polls,
        })
    }

    fn accepted() -> StubResponse {
        StubResponse::new(202, "").header("Operation-Location", "{base}/operations/42")
    }

    fn report() -> DocumentBlob {
        DocumentBlob {
            path: "/docs/report.pdf".into(),
            bytes: b"%PDF-1.7".to_vec(),
        }
    }

    #[tokio::test]
    async fn test_submits_then_polls_operation() {
        let stub = HttpStub::start(vec![
            accepted(),
            StubResponse::new(200, r#"{"status":"running"}"#),
            StubResponse::new(
                200,
                r#"{"status":"succeeded","analyzeResult":{"content":"Report body text","pages":[{"pageNumber":1},{"pageNumber":2}]}}"#,
            ),
        ])
        .await;

        let result = recognizer(&stub, 10).analyze(&report(), "1-3").await.unwrap();

        assert_eq!(result.content, "Report body text");
        assert_eq!(result.pages.len(), 2);

        let requests = stub.requests();
        assert_eq!(requests.len(), 3);
        let submit = &requests[0];
        assert_eq!(submit.method, "POST");
        assert!(submit.target.ends_with("prebuilt-document:analyze?api-version=2023-07-31&pages=1-3"));
        assert_eq!(submit.header("Ocp-Apim-Subscription-Key"), Some("forms-key"));
        assert_eq!(submit.header("Content-Type"), Some("application/octet-stream"));
        assert_eq!(submit.body, b"%PDF-1.7");
        for poll in &requests[1..] {
            assert_eq!(poll.method, "GET");
            assert_eq!(poll.target, "/operations/42");
            assert_eq!(poll.header("Ocp-Apim-Subscription-Key"), Some("forms-key"));
        }
    }

    #[tokio::test]
    async fn test_failed_operation() {
        let stub = HttpStub::start(vec![
            accepted(),
            StubResponse::new(200, r#"{"status":"failed","error":{"message":"Corrupt file"}}"#),
        ])
        .await;

        let err = recognizer(&stub, 10).analyze(&report(), "1-999").await.unwrap_err();

        assert!(matches!(err, AnalysisError::Failed(ref m) if m == "Corrupt file"));
    }

    #[tokio::test]
    async fn test_rejected_submission() {
        let stub = HttpStub::start(vec![StubResponse::new(
            401,
            r#"{"error":{"code":"401","message":"Access denied"}}"#,
        )])
        .await;

        let err = recognizer(&stub, 10).analyze(&report(), "1-999").await.unwrap_err();

        assert!(matches!(err, AnalysisError::Service { status: 401, ref message } if message.contains("Access denied")));
        assert_eq!(stub.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_operation_location() {
        let stub = HttpStub::start(vec![StubResponse::new(202, "")]).await;

        let err = recognizer(&stub, 10).analyze(&report(), "1-999").await.unwrap_err();

        assert!(matches!(err, AnalysisError::Parse(_)));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_polls() {
        let stub = HttpStub::start(vec![
            accepted(),
            StubResponse::new(200, r#"{"status":"running"}"#),
        ])
        .await;

        let err = recognizer(&stub, 3).analyze(&report(), "1-999").await.unwrap_err();

        assert!(matches!(err, AnalysisError::TimedOut(3)));
        assert_eq!(stub.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_poll_error_status() {
        let stub = HttpStub::start(vec![accepted(), StubResponse::new(503, "busy")]).await;

        let err = recognizer(&stub, 10).analyze(&report(), "1-999").await.unwrap_err();

        assert!(matches!(err, AnalysisError::Service { status: 503, .. }));
    }

    #[test]
    fn test_analyze_url() {
        let analyzer = FormRecognizer::new(FormRecognizerConfig::new(
            "https://forms.example/".into(),
            "key".into(),
        ));
        assert_eq!(
            analyzer.analyze_url("1-999"),
            "https://forms.example/formrecognizer/documentModels/prebuilt-document:analyze?api-version=2023-07-31&pages=1-999"
        );
    }

    #[test]
    fn test_operation_response_parses_result() {
        let op: OperationResponse = serde_json::from_str(
            r#"{
                "status": "succeeded",
                "analyzeResult": {
                    "content": "Report body text",
                    "pages": [{"pageNumber": 1, "width": 8.5}, {"pageNumber": 2}]
                }
            }"#,
        )
        .unwrap();
        let result = op.analyze_result.unwrap();
        assert_eq!(result.content, "Report body text");
        assert_eq!(result.pages.len(), 2);
    }

    #[test]
    fn test_operation_response_running() {
        let op: OperationResponse = serde_json::from_str(r#"{"status": "running"}"#).unwrap();
        assert_eq!(op.status, "running");
        assert!(op.analyze_result.is_none());
    }
}
