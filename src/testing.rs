//! Test doubles for the store, analysis and completion seams, plus a local
//! HTTP stub for the REST clients.

use crate::analysis::{AnalysisError, AnalysisService, AnalyzeResult, DocumentBlob, Page};
use crate::llm::{CompletionClient, CompletionRequest, CompletionResponse, LlmError};
use crate::store::{ArtifactStore, DocumentSource, StoreError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Default)]
pub struct MemoryStore {
    artifacts: Mutex<HashMap<String, String>>,
    documents: HashMap<String, Vec<u8>>,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, path: &str, bytes: &[u8]) -> Self {
        self.documents.insert(path.to_string(), bytes.to_vec());
        self
    }

    pub fn with_artifact(self, path: &str, text: &str) -> Self {
        self.artifacts
            .lock()
            .unwrap()
            .insert(path.to_string(), text.to_string());
        self
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn artifact(&self, path: &str) -> Option<String> {
        self.artifacts.lock().unwrap().get(path).cloned()
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        Ok(self.artifacts.lock().unwrap().contains_key(path))
    }

    async fn read(&self, path: &str) -> Result<Option<String>, StoreError> {
        Ok(self.artifact(path))
    }

    async fn write(&self, path: &str, text: &str) -> Result<String, StoreError> {
        if self.fail_writes {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        self.artifacts
            .lock()
            .unwrap()
            .insert(path.to_string(), text.to_string());
        Ok(path.to_string())
    }
}

#[async_trait]
impl DocumentSource for MemoryStore {
    async fn read_document(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.documents.get(path).cloned())
    }
}

// ============================================================================
// Counting analyzer
// ============================================================================

pub struct CountingAnalyzer {
    content: String,
    pages: usize,
    error: Mutex<Option<AnalysisError>>,
    calls: AtomicUsize,
    gate: Option<Notify>,
}

impl CountingAnalyzer {
    pub fn returning(content: &str, pages: usize) -> Self {
        Self {
            content: content.to_string(),
            pages,
            error: Mutex::new(None),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub fn failing(error: AnalysisError) -> Self {
        Self {
            error: Mutex::new(Some(error)),
            ..Self::returning("", 0)
        }
    }

    /// Block every analysis until `release` is called.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Notify::new());
        self
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisService for CountingAnalyzer {
    async fn analyze(
        &self,
        _document: &DocumentBlob,
        _page_range: &str,
    ) -> Result<AnalyzeResult, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(error) = self.error.lock().unwrap().take() {
            return Err(error);
        }
        Ok(AnalyzeResult {
            content: self.content.clone(),
            pages: (1..=self.pages as u32)
                .map(|page_number| Page { page_number })
                .collect(),
        })
    }
}

// ============================================================================
// Mock completion client
// ============================================================================

/// Completion client that returns queued response bodies
#[derive(Default)]
pub struct MockCompletionClient {
    responses: Mutex<VecDeque<Result<String, String>>>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl MockCompletionClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw JSON body
    pub fn queue_body(&self, body: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(body.to_string()));
    }

    pub fn queue_reply(&self, finish_reason: &str, content: &str) {
        let body = serde_json::json!({
            "choices": [{
                "finish_reason": finish_reason,
                "message": { "role": "assistant", "content": content }
            }]
        });
        self.queue_body(&body.to_string());
    }

    /// Queue a transport failure
    pub fn queue_transport_error(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for MockCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("No mock response queued".into()));
        match next {
            Ok(body) => crate::llm::azure::parse_completion(&body),
            Err(message) => Err(LlmError::Parse(message)),
        }
    }
}

// ============================================================================
// HTTP stub
// ============================================================================

/// Request as seen by [`HttpStub`]. Header names are lowercased.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct StubResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

impl StubResponse {
    pub fn new(status: u16, body: &str) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    /// `{base}` in the value is replaced with the stub's base URL.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// One-connection-at-a-time HTTP server answering with queued responses.
/// The last response repeats once the queue is down to one.
pub struct HttpStub {
    addr: std::net::SocketAddr,
    requests: std::sync::Arc<Mutex<Vec<RecordedRequest>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl HttpStub {
    pub async fn start(responses: Vec<StubResponse>) -> Self {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base = format!("http://{}", addr);
        let requests = std::sync::Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();
        let mut queue: VecDeque<StubResponse> = responses.into();

        let handle = tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                let header_end = loop {
                    let n = socket.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break None;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        break Some(pos);
                    }
                };
                let Some(header_end) = header_end else { continue };

                let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
                let mut lines = head.split("\r\n");
                let mut request_line = lines.next().unwrap_or("").split_whitespace();
                let method = request_line.next().unwrap_or("").to_string();
                let target = request_line.next().unwrap_or("").to_string();
                let headers: HashMap<String, String> = lines
                    .filter_map(|line| line.split_once(':'))
                    .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
                    .collect();

                let length: usize = headers
                    .get("content-length")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0);
                let mut body = buf[header_end + 4..].to_vec();
                while body.len() < length {
                    let n = socket.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    body.extend_from_slice(&chunk[..n]);
                }

                recorded.lock().unwrap().push(RecordedRequest {
                    method,
                    target,
                    headers,
                    body,
                });

                let response = if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
                .unwrap_or_else(|| StubResponse::new(500, "no stub response"));

                let mut raw = format!("HTTP/1.1 {} STUB\r\n", response.status);
                for (name, value) in &response.headers {
                    raw.push_str(&format!("{}: {}\r\n", name, value.replace("{base}", &base)));
                }
                raw.push_str(&format!(
                    "Content-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    response.body.len(),
                    response.body
                ));
                let _ = socket.write_all(raw.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self {
            addr,
            requests,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for HttpStub {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
