//! Test utilities shared across the workspace.
//! Only compiled when running tests or with the `testing` feature.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::error::Error;
use crate::message::{Message, ToolCall, Usage};
use crate::provider::{CompletionRequest, CompletionResponse, FinishReason, Provider};
use crate::search::{SearchProvider, SearchResult};

/// A mock provider that returns pre-configured responses.
pub struct MockProvider {
    responses: Mutex<Vec<Result<CompletionResponse, Error>>>,
    /// Captured requests (for assertion).
    pub captured_requests: Mutex<Vec<CompletionRequest>>,
    pub name: String,
    pub default_model: Option<String>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            captured_requests: Mutex::new(Vec::new()),
            name: "mock".to_string(),
            default_model: None,
        }
    }

    /// Queue a text response to be returned by the next complete() call.
    /// Responses are returned in FIFO order (first queued = first returned).
    pub fn queue_response(&self, content: &str) {
        self.queue_raw_response(CompletionResponse {
            message: Message::assistant(content),
            usage: Usage::new(0, 0),
            model: "mock-model".to_string(),
            finish_reason: FinishReason::Stop,
        });
    }

    /// Queue a response in which the model asks for a tool call.
    pub fn queue_tool_call(&self, call: ToolCall) {
        self.queue_raw_response(CompletionResponse {
            message: Message::assistant_with_tool_calls("", vec![call]),
            usage: Usage::new(0, 0),
            model: "mock-model".to_string(),
            finish_reason: FinishReason::ToolCalls,
        });
    }

    /// Queue a raw CompletionResponse.
    pub fn queue_raw_response(&self, response: CompletionResponse) {
        self.responses.lock().unwrap().insert(0, Ok(response));
    }

    /// Queue a failure for the next complete() call.
    pub fn queue_error(&self, error: Error) {
        self.responses.lock().unwrap().insert(0, Err(error));
    }

    /// Get the number of captured requests.
    pub fn request_count(&self) -> usize {
        self.captured_requests.lock().unwrap().len()
    }

    /// Get the last captured request.
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.captured_requests.lock().unwrap().last().cloned()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, Error> {
        self.captured_requests.lock().unwrap().push(request);
        match self.responses.lock().unwrap().pop() {
            Some(response) => response,
            None => Err(Error::Unknown("No mock response queued".to_string())),
        }
    }
}

/// A mock search backend with queued outcomes.
pub struct MockSearch {
    outcomes: Mutex<Vec<Result<Vec<SearchResult>, Error>>>,
    /// Queries received, in call order.
    pub queries: Mutex<Vec<String>>,
}

impl MockSearch {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Queue a result list for the next search() call (FIFO).
    pub fn queue_results(&self, results: Vec<SearchResult>) {
        self.outcomes.lock().unwrap().insert(0, Ok(results));
    }

    /// Queue a failure for the next search() call (FIFO).
    pub fn queue_error(&self, error: Error) {
        self.outcomes.lock().unwrap().insert(0, Err(error));
    }

    pub fn call_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn last_query(&self) -> Option<String> {
        self.queries.lock().unwrap().last().cloned()
    }
}

impl Default for MockSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchProvider for MockSearch {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, Error> {
        self.queries.lock().unwrap().push(query.to_string());
        self.outcomes
            .lock()
            .unwrap()
            .pop()
            .unwrap_or(Err(Error::Unknown("No mock search outcome queued".to_string())))
    }
}

/// Three canned articles about an earthquake.
pub fn earthquake_results() -> Vec<SearchResult> {
    vec![
        SearchResult::new(
            "Magnitude 6.1 earthquake strikes off the coast",
            "A strong earthquake struck early Tuesday, officials said.",
            "https://news.example.com/quake-coast",
        ),
        SearchResult::new(
            "Aftershocks rattle region after quake",
            "Several aftershocks followed the main tremor.",
            "https://news.example.com/aftershocks",
        ),
        SearchResult::new(
            "No tsunami warning issued",
            "Authorities said there was no tsunami threat.",
            "https://news.example.com/tsunami",
        ),
    ]
}
