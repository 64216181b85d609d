//! HTTP boundary: `/api/news` and `/health`.
//!
//! Success bodies are `{"result": {"content": ...}}` (prose deployments) or
//! `{"articles": [...]}` (article deployments). Every failure is
//! `{"error": "<message>"}` with a 400 or 500 status.

use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;

use newsq_agents::{Pipeline, PipelineError, ProseAnswer};
use newsq_core::SearchResult;

/// Converts pipeline output into the success body for its deployment.
pub trait Envelope {
    fn into_envelope(self) -> Value;
}

impl Envelope for ProseAnswer {
    fn into_envelope(self) -> Value {
        json!({ "result": { "content": self.content } })
    }
}

impl Envelope for Vec<SearchResult> {
    fn into_envelope(self) -> Value {
        json!({ "articles": self })
    }
}

/// Error response with a uniform `{"error": message}` body
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = self.status.as_u16(), "{}", self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct NewsParams {
    #[serde(default)]
    pub query: Option<String>,
}

async fn news_handler<P>(
    State(pipeline): State<Arc<P>>,
    params: Result<Query<NewsParams>, QueryRejection>,
) -> Result<Json<Value>, ApiError>
where
    P: Pipeline + 'static,
    P::Output: Envelope,
{
    // An unparseable query string counts as a missing query.
    let query = params
        .ok()
        .and_then(|Query(p)| p.query)
        .unwrap_or_default();

    let output = pipeline.run(&query).await?;
    Ok(Json(output.into_envelope()))
}

async fn health_handler<P>(State(pipeline): State<Arc<P>>) -> Json<Value>
where
    P: Pipeline + 'static,
{
    Json(json!({ "status": "ok", "variant": pipeline.variant() }))
}

/// Build the router for one deployment's pipeline.
pub fn router<P>(pipeline: Arc<P>) -> Router
where
    P: Pipeline + 'static,
    P::Output: Envelope,
{
    Router::new()
        .route("/api/news", get(news_handler::<P>))
        .route("/health", get(health_handler::<P>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(pipeline)
}

/// Render a pipeline outcome as status and body, outside of HTTP.
pub fn render<T: Envelope>(outcome: Result<T, PipelineError>) -> (StatusCode, Value) {
    match outcome {
        Ok(output) => (StatusCode::OK, output.into_envelope()),
        Err(err) => {
            let err = ApiError::from(err);
            (err.status, json!({ "error": err.message }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use newsq_agents::{ArticleFeed, NewsPipeline, Synthesizer};
    use newsq_core::testing::{earthquake_results, MockProvider, MockSearch};
    use newsq_core::{Error, ToolCall};
    use newsq_tools::{SerpApiConfig, SerpApiSearch};
    use tower::ServiceExt;

    struct Fixture {
        provider: Arc<MockProvider>,
        search: Arc<MockSearch>,
        app: Router,
    }

    fn prose_fixture() -> Fixture {
        let provider = Arc::new(MockProvider::new());
        let search = Arc::new(MockSearch::new());
        let pipeline = NewsPipeline::new(Synthesizer::new(provider.clone()), search.clone());
        Fixture {
            provider,
            search,
            app: router(Arc::new(pipeline)),
        }
    }

    fn search_call() -> ToolCall {
        ToolCall::new("call_1", "search", serde_json::json!({ "input": "earthquake news" }))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_empty_query_is_bad_request() {
        for uri in ["/api/news?query=", "/api/news", "/api/news?query=%20%20"] {
            let f = prose_fixture();
            let (status, body) = get_json(f.app, uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body, json!({ "error": "Missing query parameter" }));
            assert_eq!(f.provider.request_count(), 0);
            assert_eq!(f.search.call_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_out_of_scope_is_refusal_with_ok() {
        let f = prose_fixture();
        f.provider.queue_response("Please ask a news-related question.");

        let (status, body) = get_json(f.app, "/api/news?query=tell%20me%20a%20joke").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "result": { "content": "Please ask a news-related question." } })
        );
    }

    #[tokio::test]
    async fn test_search_backed_answer() {
        let f = prose_fixture();
        f.provider.queue_tool_call(search_call());
        f.search.queue_results(earthquake_results());
        f.provider.queue_response(
            "A magnitude 6.1 earthquake struck off the coast ([source](https://news.example.com/quake-coast)).",
        );

        let (status, body) = get_json(f.app, "/api/news?query=latest%20earthquake%20news").await;
        assert_eq!(status, StatusCode::OK);
        let content = body["result"]["content"].as_str().unwrap();
        assert!(content.contains("https://news.example.com/quake-coast"));
        assert_eq!(f.search.call_count(), 1);
        assert_eq!(f.provider.request_count(), 2);
    }

    #[tokio::test]
    async fn test_no_results_is_bad_request() {
        let f = prose_fixture();
        f.provider.queue_tool_call(search_call());
        f.search.queue_results(Vec::new());

        let (status, body) = get_json(f.app, "/api/news?query=latest+earthquake+news").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "No news articles found." }));
    }

    #[tokio::test]
    async fn test_missing_search_key_is_server_error() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_tool_call(search_call());
        let search = Arc::new(SerpApiSearch::new(SerpApiConfig::new(None)));
        let app = router(Arc::new(NewsPipeline::new(Synthesizer::new(provider), search)));

        let (status, body) = get_json(app, "/api/news?query=latest%20earthquake%20news").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Missing SERPAPI_API_KEY" }));
    }

    #[tokio::test]
    async fn test_upstream_failures_are_server_errors() {
        let f = prose_fixture();
        f.provider.queue_tool_call(search_call());
        f.search.queue_error(Error::api(503, "Service Unavailable"));
        let (status, body) = get_json(f.app, "/api/news?query=earthquake").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.get("result").is_none());
        assert!(body["error"].as_str().unwrap().contains("Service Unavailable"));

        let f = prose_fixture();
        f.provider.queue_error(Error::auth("Invalid API Key"));
        let (status, _) = get_json(f.app, "/api/news?query=earthquake").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let f = prose_fixture();
        f.provider.queue_response("");
        let (status, body) = get_json(f.app, "/api/news?query=earthquake").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "The model returned no content" }));
    }

    #[tokio::test]
    async fn test_articles_deployment() {
        let search = Arc::new(MockSearch::new());
        search.queue_results(earthquake_results());
        let app = router(Arc::new(ArticleFeed::new(search.clone())));

        let (status, body) = get_json(app, "/api/news?query=earthquake").await;
        assert_eq!(status, StatusCode::OK);
        let articles = body["articles"].as_array().unwrap();
        assert_eq!(articles.len(), 3);
        assert_eq!(articles[0]["title"], "Magnitude 6.1 earthquake strikes off the coast");
        assert_eq!(articles[2]["link"], "https://news.example.com/tsunami");
        assert!(body.get("result").is_none());
    }

    #[tokio::test]
    async fn test_articles_missing_key() {
        let search = Arc::new(SerpApiSearch::new(SerpApiConfig::new(None)));
        let app = router(Arc::new(ArticleFeed::new(search)));

        let (status, body) = get_json(app, "/api/news?query=earthquake").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Missing SERPAPI_API_KEY" }));
    }

    #[tokio::test]
    async fn test_health_reports_variant() {
        let search = Arc::new(MockSearch::new());
        let app = router(Arc::new(ArticleFeed::new(search)));
        let (status, body) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok", "variant": "articles" }));
    }

    #[test]
    fn test_render() {
        let (status, body) = render(Ok(ProseAnswer::new("hi")));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "result": { "content": "hi" } }));

        let (status, body) = render::<ProseAnswer>(Err(PipelineError::NoArticlesFound));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "No news articles found." }));
    }
}
