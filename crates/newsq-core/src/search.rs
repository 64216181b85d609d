//! Web search abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// One search hit, in the order the provider ranked it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub link: String,
}

impl SearchResult {
    pub fn new(
        title: impl Into<String>,
        snippet: impl Into<String>,
        link: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            snippet: snippet.into(),
            link: link.into(),
        }
    }
}

/// A third-party web search backend.
///
/// `search` performs exactly one upstream call and returns the provider's
/// list untouched: no filtering, re-ranking or deduplication. Missing
/// credentials must surface as [`Error::Config`] before any network access.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_default_to_empty() {
        let result: SearchResult =
            serde_json::from_str(r#"{"title": "Quake hits coast"}"#).unwrap();
        assert_eq!(result.title, "Quake hits coast");
        assert!(result.snippet.is_empty());
        assert!(result.link.is_empty());
    }
}
