//! Web search through SerpAPI.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use newsq_core::{Error, SearchProvider, SearchResult};

/// Environment variable that conventionally holds the SerpAPI key.
pub const SERPAPI_KEY_VAR: &str = "SERPAPI_API_KEY";

const DEFAULT_BASE_URL: &str = "https://serpapi.com";

// SerpAPI answers 200 with this error when a query simply has no hits.
const NO_RESULTS_MARKER: &str = "hasn't returned any results";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the SerpAPI search adapter
#[derive(Clone, Debug)]
pub struct SerpApiConfig {
    /// API key. `None` is accepted at construction and reported on first use.
    pub api_key: Option<String>,
    /// Base URL (e.g., "https://serpapi.com")
    pub base_url: String,
    /// Search engine ("google", "google_news", ...)
    pub engine: String,
    /// Number of results to request
    pub num: u32,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for SerpApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            engine: "google".to_string(),
            num: 10,
            timeout: Duration::from_secs(15),
        }
    }
}

impl SerpApiConfig {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = engine.into();
        self
    }

    pub fn with_num(mut self, num: u32) -> Self {
        self.num = num;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether a usable (non-blank) key is present.
    pub fn has_key(&self) -> bool {
        self.key().is_ok()
    }

    fn key(&self) -> Result<&str, Error> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::config(format!("Missing {}", SERPAPI_KEY_VAR)))
    }
}

// =============================================================================
// Search adapter
// =============================================================================

pub struct SerpApiSearch {
    client: Client,
    config: SerpApiConfig,
}

impl SerpApiSearch {
    pub fn new(config: SerpApiConfig) -> Self {
        Self {
            client: Client::builder()
                .user_agent(concat!("newsq/", env!("CARGO_PKG_VERSION")))
                .timeout(config.timeout)
                .build()
                .unwrap_or_default(),
            config,
        }
    }
}

#[derive(Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    news_results: Vec<SerpApiItem>,
    #[serde(default)]
    organic_results: Vec<SerpApiItem>,
}

#[derive(Deserialize)]
struct SerpApiItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    link: String,
}

impl From<SerpApiItem> for SearchResult {
    fn from(item: SerpApiItem) -> Self {
        SearchResult::new(item.title, item.snippet, item.link)
    }
}

/// Turn an HTTP status and body into results, preserving provider order.
fn parse_body(status: u16, body: &str) -> Result<Vec<SearchResult>, Error> {
    if !(200..300).contains(&status) {
        let message = serde_json::from_str::<SerpApiResponse>(body)
            .ok()
            .and_then(|r| r.error)
            .unwrap_or_else(|| body.chars().take(512).collect());
        return Err(Error::api(status, message));
    }

    let parsed: SerpApiResponse = serde_json::from_str(body)
        .map_err(|e| Error::serialization(format!("Malformed SerpAPI response: {}", e)))?;

    if let Some(message) = parsed.error {
        if message.contains(NO_RESULTS_MARKER) {
            return Ok(Vec::new());
        }
        return Err(Error::api(status, message));
    }

    let items = if parsed.news_results.is_empty() {
        parsed.organic_results
    } else {
        parsed.news_results
    };

    Ok(items.into_iter().map(SearchResult::from).collect())
}

#[async_trait]
impl SearchProvider for SerpApiSearch {
    fn name(&self) -> &str {
        "serpapi"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, Error> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::invalid_request("Search query must not be empty"));
        }
        let key = self.config.key()?;

        let num = self.config.num.to_string();
        debug!(engine = %self.config.engine, query, "SerpAPI search");

        let response = self
            .client
            .get(format!("{}/search.json", self.config.base_url))
            .query(&[
                ("engine", self.config.engine.as_str()),
                ("q", query),
                ("num", num.as_str()),
                ("api_key", key),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(format!("SerpAPI request timed out: {}", e))
                } else {
                    Error::network(format!("SerpAPI request failed: {}", e))
                }
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::network(format!("Failed to read SerpAPI response: {}", e)))?;

        let results = parse_body(status, &body);
        match &results {
            Ok(items) => debug!(count = items.len(), "SerpAPI returned results"),
            Err(e) => warn!(status, error = %e, "SerpAPI search failed"),
        }
        results
    }
}
