//! Two-phase language-model protocol: classify, then answer from search results.
//!
//! Phase 1 ([`Synthesizer::classify`]) sends the query under the news policy
//! with the search tool offered, and returns a typed [`Decision`]. Phase 2
//! ([`Synthesizer::answer`]) is only reachable with a [`ToolInvocation`] from
//! phase 1; it attaches the search results and offers no tools, so the model
//! cannot ask for another round.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use newsq_core::{CompletionRequest, Error, Message, Provider, SearchResult, ToolCall};

use crate::policy::{self, SEARCH_TOOL_ARGUMENT, SEARCH_TOOL_NAME};
use crate::query::Query;

/// A search the model asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Correlation id linking the tool call to its result.
    pub id: String,
    /// Search query chosen by the model. Authoritative, may differ from the user's text.
    pub query: String,
}

impl ToolInvocation {
    fn from_call(call: &ToolCall, fallback: &Query) -> Self {
        let id = if call.id.trim().is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            call.id.clone()
        };

        let query = call
            .string_argument(SEARCH_TOOL_ARGUMENT)
            .or_else(|| call.string_argument("query"))
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .unwrap_or(fallback.as_str())
            .to_string();

        Self { id, query }
    }

    fn as_tool_call(&self) -> ToolCall {
        let mut arguments = serde_json::Map::new();
        arguments.insert(SEARCH_TOOL_ARGUMENT.to_string(), self.query.clone().into());
        ToolCall::new(self.id.clone(), SEARCH_TOOL_NAME, arguments.into())
    }
}

/// Phase-1 outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Out of scope; render [`policy::REFUSAL`].
    Refuse,
    /// In scope and answered without search.
    FinalAnswer(String),
    /// In scope, needs fresh data.
    NeedsSearch(ToolInvocation),
}

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("Model request failed: {0}")]
    Model(#[from] Error),

    #[error("The model returned no content")]
    EmptyContent,
}

/// Settings applied to every model request.
#[derive(Debug, Clone)]
pub struct SynthesizerConfig {
    /// Overrides the provider's default model when set.
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.0,
            max_tokens: None,
        }
    }
}

pub struct Synthesizer {
    provider: Arc<dyn Provider>,
    config: SynthesizerConfig,
}

impl Synthesizer {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self::with_config(provider, SynthesizerConfig::default())
    }

    pub fn with_config(provider: Arc<dyn Provider>, config: SynthesizerConfig) -> Self {
        Self { provider, config }
    }

    fn request(&self, messages: Vec<Message>) -> CompletionRequest {
        let mut request = CompletionRequest::new(messages).with_temperature(self.config.temperature);
        let model = self
            .config
            .model
            .as_deref()
            .or_else(|| self.provider.default_model());
        if let Some(model) = model {
            request = request.with_model(model);
        }
        if let Some(max_tokens) = self.config.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        request
    }

    /// Phase 1: apply the news policy and decide whether to search.
    pub async fn classify(&self, query: &Query) -> Result<Decision, SynthesisError> {
        let request = self
            .request(vec![
                Message::system(policy::system_prompt()),
                Message::user(query.as_str()),
            ])
            .with_tools(vec![policy::search_tool()]);

        let response = self.provider.complete(request).await?;
        let message = response.message;
        debug!(
            provider = self.provider.name(),
            model = %response.model,
            tool_calls = message.tool_calls.len(),
            "classification response"
        );

        let mut calls = message
            .tool_calls
            .iter()
            .filter(|c| c.name == SEARCH_TOOL_NAME);
        if let Some(call) = calls.next() {
            let ignored = calls.count();
            if ignored > 0 {
                warn!(ignored, "model requested several searches; only the first runs");
            }
            return Ok(Decision::NeedsSearch(ToolInvocation::from_call(call, query)));
        }
        if message.has_tool_calls() {
            warn!("model requested an unknown tool; treating as a plain answer");
        }

        let content = message.content.trim();
        if content.is_empty() {
            return Err(SynthesisError::EmptyContent);
        }
        if policy::is_refusal(content) {
            return Ok(Decision::Refuse);
        }
        Ok(Decision::FinalAnswer(content.to_string()))
    }

    /// Phase 2: answer the query grounded in the search results.
    pub async fn answer(
        &self,
        query: &Query,
        invocation: &ToolInvocation,
        results: &[SearchResult],
    ) -> Result<String, SynthesisError> {
        let tool_output = serde_json::to_string(results).map_err(Error::from)?;

        let request = self.request(vec![
            Message::system(policy::answer_prompt()),
            Message::user(query.as_str()),
            Message::assistant_with_tool_calls("", vec![invocation.as_tool_call()]),
            Message::tool_result(invocation.id.clone(), tool_output),
        ]);

        let response = self.provider.complete(request).await?;
        if response.message.has_tool_calls() {
            warn!("model asked for another tool call after search; not honored");
        }

        let content = response.message.content.trim();
        if content.is_empty() {
            return Err(SynthesisError::EmptyContent);
        }
        Ok(content.to_string())
    }
}
