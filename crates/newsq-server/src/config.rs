use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use newsq_agents::{ResponseVariant, SynthesizerConfig};
use newsq_providers::{OpenAIProvider, GROQ_BASE_URL};
use newsq_tools::{SerpApiConfig, SERPAPI_KEY_VAR};

/// Environment variable holding the language model key.
pub const MODEL_KEY_VAR: &str = "GROQ_API_KEY";

const ENV_PREFIX: &str = "NEWSQ_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Socket address to listen on
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Response shape served by this deployment
    #[serde(default)]
    pub variant: ResponseVariant,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub search: SearchConfig,
}

/// Language model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_model_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Kept at 0 so classification is repeatable
    #[serde(default)]
    pub temperature: f32,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
}

/// Search provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_search_base_url")]
    pub base_url: String,

    /// SerpAPI engine ("google", "google_news")
    #[serde(default = "default_engine")]
    pub engine: String,

    #[serde(default = "default_num")]
    pub num: u32,

    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_model_base_url() -> String {
    GROQ_BASE_URL.to_string()
}

fn default_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

fn default_model_timeout() -> u64 {
    60
}

fn default_search_base_url() -> String {
    "https://serpapi.com".to_string()
}

fn default_engine() -> String {
    "google".to_string()
}

fn default_num() -> u32 {
    10
}

fn default_search_timeout() -> u64 {
    15
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            variant: ResponseVariant::default(),
            model: ModelConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_model_base_url(),
            model: default_model(),
            temperature: 0.0,
            max_tokens: None,
            timeout_secs: default_model_timeout(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_search_base_url(),
            engine: default_engine(),
            num: default_num(),
            timeout_secs: default_search_timeout(),
        }
    }
}

impl Config {
    /// Layered sources: defaults, TOML file, `NEWSQ_*` env, well-known key vars.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        match path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                figment = figment.merge(Toml::file(path));
            }
            None => {
                if let Ok(default_path) = Self::config_path() {
                    if default_path.exists() {
                        figment = figment.merge(Toml::file(default_path));
                    }
                }
            }
        }

        Ok(figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Env::raw().only(&[SERPAPI_KEY_VAR]).map(|_| "search.api_key".into()))
            .merge(Env::raw().only(&[MODEL_KEY_VAR]).map(|_| "model.api_key".into())))
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::figment(path)?
            .extract()
            .context("Invalid configuration")
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("newsq").join("config.toml"))
    }

    /// Build the model client. The key is required up front.
    pub fn build_provider(&self) -> Result<OpenAIProvider> {
        let api_key = self
            .model
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow::anyhow!("Missing {}", MODEL_KEY_VAR))?;

        Ok(OpenAIProvider::new(api_key)
            .with_base_url(&self.model.base_url)
            .with_default_model(&self.model.model)
            .with_timeout(Duration::from_secs(self.model.timeout_secs)))
    }

    /// Request settings. The model name travels with the provider as its default.
    pub fn synthesizer_config(&self) -> SynthesizerConfig {
        SynthesizerConfig {
            model: None,
            temperature: self.model.temperature,
            max_tokens: self.model.max_tokens,
        }
    }

    /// Search settings. A missing key is reported on first use, not here.
    pub fn serpapi_config(&self) -> SerpApiConfig {
        SerpApiConfig::new(self.search.api_key.clone())
            .with_base_url(&self.search.base_url)
            .with_engine(&self.search.engine)
            .with_num(self.search.num)
            .with_timeout(Duration::from_secs(self.search.timeout_secs))
    }

    /// Copy with secrets replaced, for display.
    pub fn masked(&self) -> Self {
        let mut config = self.clone();
        config.model.api_key = config.model.api_key.as_deref().map(mask);
        config.search.api_key = config.search.api_key.as_deref().map(mask);
        config
    }
}

fn mask(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("{}****", visible)
    }
}
