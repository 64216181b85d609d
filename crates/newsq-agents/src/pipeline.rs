//! Query pipelines: validation, classification, one bounded search, synthesis.
//!
//! A deployment serves exactly one [`ResponseVariant`]. Each variant is its own
//! [`Pipeline`] type so the response shape is fixed when the server starts.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use newsq_core::{Error, SearchProvider, SearchResult};

use crate::policy::REFUSAL;
use crate::query::Query;
use crate::synthesizer::{Decision, SynthesisError, Synthesizer, ToolInvocation};

/// Which response shape a deployment produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseVariant {
    /// Model-written markdown answer.
    #[default]
    Prose,
    /// Raw search results as article cards.
    Articles,
}

impl fmt::Display for ResponseVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseVariant::Prose => write!(f, "prose"),
            ResponseVariant::Articles => write!(f, "articles"),
        }
    }
}

/// Where a run is, as reported in the `stage` log field.
///
/// Every run ends in `Done` or `Failed`; `ToolInvoking` and `Synthesizing`
/// are entered at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    Classifying,
    ToolInvoking,
    Synthesizing,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validating => "validating",
            Stage::Classifying => "classifying",
            Stage::ToolInvoking => "tool_invoking",
            Stage::Synthesizing => "synthesizing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Terminal failure of a pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Missing query parameter")]
    MissingQuery,

    #[error("{0}")]
    Configuration(String),

    #[error("Search unavailable: {0}")]
    SearchUnavailable(#[source] Error),

    #[error("No news articles found.")]
    NoArticlesFound,

    #[error("Model request failed: {0}")]
    Model(#[source] Error),

    #[error("The model returned no content")]
    EmptyContent,
}

impl PipelineError {
    /// Caused by the request rather than by this service or its upstreams.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::MissingQuery | PipelineError::NoArticlesFound)
    }

    /// HTTP status reported by the search provider or model, if any.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            PipelineError::SearchUnavailable(e) | PipelineError::Model(e) => e.status(),
            _ => None,
        }
    }
}

impl From<SynthesisError> for PipelineError {
    fn from(err: SynthesisError) -> Self {
        match err {
            SynthesisError::Model(e) if e.is_config_error() => {
                PipelineError::Configuration(e.to_string())
            }
            SynthesisError::Model(e) => PipelineError::Model(e),
            SynthesisError::EmptyContent => PipelineError::EmptyContent,
        }
    }
}

/// Prose output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProseAnswer {
    pub content: String,
}

impl ProseAnswer {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// A single-shot query pipeline shared by all concurrent requests.
#[async_trait]
pub trait Pipeline: Send + Sync {
    type Output: Send;

    fn variant(&self) -> ResponseVariant;

    async fn run(&self, query: &str) -> Result<Self::Output, PipelineError>;
}

fn validate(raw: &str) -> Result<Query, PipelineError> {
    debug!(stage = %Stage::Validating, "pipeline stage");
    Query::parse(raw).ok_or(PipelineError::MissingQuery)
}

/// Run exactly one search. An empty result set is a failure.
async fn search_once(
    search: &dyn SearchProvider,
    query: &str,
) -> Result<Vec<SearchResult>, PipelineError> {
    info!(stage = %Stage::ToolInvoking, provider = search.name(), search_query = query, "pipeline stage");

    let results = search.search(query).await.map_err(|e| {
        if e.is_config_error() {
            PipelineError::Configuration(e.to_string())
        } else {
            PipelineError::SearchUnavailable(e)
        }
    })?;

    if results.is_empty() {
        return Err(PipelineError::NoArticlesFound);
    }
    debug!(count = results.len(), "search results received");
    Ok(results)
}

fn log_outcome<T>(variant: ResponseVariant, outcome: &Result<T, PipelineError>) {
    match outcome {
        Ok(_) => debug!(stage = %Stage::Done, %variant, "pipeline stage"),
        Err(e) if e.is_client_error() => {
            info!(stage = %Stage::Failed, %variant, error = %e, "query rejected")
        }
        Err(e) => warn!(
            stage = %Stage::Failed,
            %variant,
            upstream_status = ?e.upstream_status(),
            error = %e,
            "query failed"
        ),
    }
}

/// Classifier → optional search → synthesis, producing prose.
pub struct NewsPipeline {
    synthesizer: Synthesizer,
    search: Arc<dyn SearchProvider>,
}

impl NewsPipeline {
    pub fn new(synthesizer: Synthesizer, search: Arc<dyn SearchProvider>) -> Self {
        Self {
            synthesizer,
            search,
        }
    }

    async fn execute(&self, raw: &str) -> Result<ProseAnswer, PipelineError> {
        let query = validate(raw)?;

        info!(stage = %Stage::Classifying, "pipeline stage");
        let invocation: ToolInvocation = match self.synthesizer.classify(&query).await? {
            Decision::Refuse => {
                info!("query is out of scope");
                return Ok(ProseAnswer::new(REFUSAL));
            }
            Decision::FinalAnswer(content) => return Ok(ProseAnswer::new(content)),
            Decision::NeedsSearch(invocation) => invocation,
        };

        debug!(
            call_id = %invocation.id,
            user_query = %query,
            search_query = %invocation.query,
            "model requested search"
        );
        let results = search_once(self.search.as_ref(), &invocation.query).await?;

        info!(stage = %Stage::Synthesizing, "pipeline stage");
        let content = self.synthesizer.answer(&query, &invocation, &results).await?;
        Ok(ProseAnswer::new(content))
    }
}

#[async_trait]
impl Pipeline for NewsPipeline {
    type Output = ProseAnswer;

    fn variant(&self) -> ResponseVariant {
        ResponseVariant::Prose
    }

    async fn run(&self, query: &str) -> Result<ProseAnswer, PipelineError> {
        let outcome = self.execute(query).await;
        log_outcome(self.variant(), &outcome);
        outcome
    }
}

/// Search-only pipeline returning the provider's articles.
pub struct ArticleFeed {
    search: Arc<dyn SearchProvider>,
}

impl ArticleFeed {
    pub fn new(search: Arc<dyn SearchProvider>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl Pipeline for ArticleFeed {
    type Output = Vec<SearchResult>;

    fn variant(&self) -> ResponseVariant {
        ResponseVariant::Articles
    }

    async fn run(&self, raw: &str) -> Result<Vec<SearchResult>, PipelineError> {
        let outcome = match validate(raw) {
            Ok(query) => search_once(self.search.as_ref(), query.as_str()).await,
            Err(e) => Err(e),
        };
        log_outcome(self.variant(), &outcome);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsq_core::testing::{earthquake_results, MockProvider, MockSearch};
    use newsq_core::ToolCall;

    struct Fixture {
        provider: Arc<MockProvider>,
        search: Arc<MockSearch>,
        pipeline: NewsPipeline,
    }

    fn fixture() -> Fixture {
        let provider = Arc::new(MockProvider::new());
        let search = Arc::new(MockSearch::new());
        let pipeline = NewsPipeline::new(Synthesizer::new(provider.clone()), search.clone());
        Fixture {
            provider,
            search,
            pipeline,
        }
    }

    fn search_call(input: &str) -> ToolCall {
        ToolCall::new("call_1", "search", serde_json::json!({ "input": input }))
    }

    #[tokio::test]
    async fn test_blank_query_touches_nothing() {
        let f = fixture();
        for raw in ["", "   ", "\n\t"] {
            let err = f.pipeline.run(raw).await.unwrap_err();
            assert!(matches!(err, PipelineError::MissingQuery));
            assert_eq!(err.to_string(), "Missing query parameter");
        }
        assert_eq!(f.provider.request_count(), 0);
        assert_eq!(f.search.call_count(), 0);
    }

    #[tokio::test]
    async fn test_out_of_scope_returns_refusal() {
        let f = fixture();
        f.provider.queue_response("Please ask a news-related question.");

        let answer = f.pipeline.run("tell me a joke").await.unwrap();
        assert_eq!(answer.content, REFUSAL);
        assert_eq!(f.provider.request_count(), 1);
        assert_eq!(f.search.call_count(), 0);
    }

    #[tokio::test]
    async fn test_direct_answer_skips_search() {
        let f = fixture();
        f.provider.queue_response("Parliament passed the budget on Monday.");

        let answer = f.pipeline.run("did the budget pass").await.unwrap();
        assert_eq!(answer.content, "Parliament passed the budget on Monday.");
        assert_eq!(f.search.call_count(), 0);
    }

    #[tokio::test]
    async fn test_search_then_synthesize() {
        let f = fixture();
        f.provider.queue_tool_call(search_call("earthquake news today"));
        f.search.queue_results(earthquake_results());
        f.provider.queue_response("A magnitude 6.1 earthquake struck off the coast; no tsunami warning was issued.");

        let answer = f.pipeline.run("latest earthquake news").await.unwrap();
        assert!(answer.content.contains("6.1"));
        assert_eq!(f.search.call_count(), 1);
        assert_eq!(f.search.last_query().as_deref(), Some("earthquake news today"));
        assert_eq!(f.provider.request_count(), 2);

        let second = f.provider.last_request().unwrap();
        assert!(second.messages[3].content.contains("Aftershocks rattle region"));
    }

    #[tokio::test]
    async fn test_model_cannot_loop_past_one_search() {
        let f = fixture();
        f.provider.queue_tool_call(search_call("earthquake"));
        f.search.queue_results(earthquake_results());
        f.provider.queue_tool_call(search_call("more earthquakes"));
        f.provider.queue_response("never requested");

        let err = f.pipeline.run("latest earthquake news").await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyContent));
        assert_eq!(f.search.call_count(), 1);
        assert_eq!(f.provider.request_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_results_are_no_articles() {
        let f = fixture();
        f.provider.queue_tool_call(search_call("earthquake"));
        f.search.queue_results(Vec::new());

        let err = f.pipeline.run("latest earthquake news").await.unwrap_err();
        assert!(matches!(err, PipelineError::NoArticlesFound));
        assert!(err.is_client_error());
        assert_eq!(f.provider.request_count(), 1);
    }

    #[tokio::test]
    async fn test_search_failure_is_unavailable() {
        let f = fixture();
        f.provider.queue_tool_call(search_call("earthquake"));
        f.search.queue_error(Error::api(503, "Service Unavailable"));

        let err = f.pipeline.run("latest earthquake news").await.unwrap_err();
        assert!(matches!(err, PipelineError::SearchUnavailable(_)));
        assert!(!err.is_client_error());
        assert_eq!(err.upstream_status(), Some(503));
        assert_eq!(f.provider.request_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_search_key_is_configuration() {
        let f = fixture();
        f.provider.queue_tool_call(search_call("earthquake"));
        f.search.queue_error(Error::config("Missing SERPAPI_API_KEY"));

        let err = f.pipeline.run("latest earthquake news").await.unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert_eq!(err.to_string(), "Missing SERPAPI_API_KEY");
    }

    #[tokio::test]
    async fn test_model_failure_in_second_pass() {
        let f = fixture();
        f.provider.queue_tool_call(search_call("earthquake"));
        f.search.queue_results(earthquake_results());
        f.provider.queue_error(Error::rate_limit("quota exceeded"));

        let err = f.pipeline.run("latest earthquake news").await.unwrap_err();
        assert!(matches!(err, PipelineError::Model(Error::RateLimit(_))));
        assert_eq!(err.upstream_status(), Some(429));
    }

    #[test]
    fn test_upstream_status_only_for_upstream_failures() {
        assert_eq!(PipelineError::Model(Error::auth("bad key")).upstream_status(), Some(401));
        assert_eq!(
            PipelineError::SearchUnavailable(Error::network("reset")).upstream_status(),
            None
        );
        assert_eq!(PipelineError::NoArticlesFound.upstream_status(), None);
        assert_eq!(PipelineError::Configuration("Missing".into()).upstream_status(), None);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::ToolInvoking.to_string(), "tool_invoking");
        assert_eq!(Stage::Done.to_string(), "done");
        assert_eq!(Stage::Failed.to_string(), "failed");
    }

    #[tokio::test]
    async fn test_same_mocks_same_shape() {
        for _ in 0..3 {
            let f = fixture();
            f.provider.queue_tool_call(search_call("earthquake"));
            f.search.queue_results(earthquake_results());
            f.provider.queue_response("Summary of three reports.");

            let answer = f.pipeline.run("latest earthquake news").await.unwrap();
            assert_eq!(answer, ProseAnswer::new("Summary of three reports."));
        }
    }

    #[tokio::test]
    async fn test_article_feed_returns_provider_order() {
        let search = Arc::new(MockSearch::new());
        search.queue_results(earthquake_results());
        let feed = ArticleFeed::new(search.clone());

        let articles = feed.run("  latest earthquake news ").await.unwrap();
        assert_eq!(articles, earthquake_results());
        assert_eq!(search.last_query().as_deref(), Some("latest earthquake news"));
        assert_eq!(feed.variant(), ResponseVariant::Articles);
    }

    #[tokio::test]
    async fn test_article_feed_errors() {
        let search = Arc::new(MockSearch::new());
        let feed = ArticleFeed::new(search.clone());

        assert!(matches!(feed.run("").await, Err(PipelineError::MissingQuery)));
        assert_eq!(search.call_count(), 0);

        search.queue_results(Vec::new());
        assert!(matches!(feed.run("news").await, Err(PipelineError::NoArticlesFound)));
    }

    #[test]
    fn test_variant_serde() {
        let v: ResponseVariant = serde_json::from_str("\"articles\"").unwrap();
        assert_eq!(v, ResponseVariant::Articles);
        assert_eq!(ResponseVariant::default().to_string(), "prose");
    }
}
