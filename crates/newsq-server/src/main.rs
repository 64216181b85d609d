use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use newsq_agents::{ArticleFeed, NewsPipeline, Pipeline, ResponseVariant, Synthesizer};
use newsq_core::SearchProvider;
use newsq_tools::SerpApiSearch;

mod api;
mod config;

use api::Envelope;
use config::Config;

/// Log level for tracing output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Most verbose: all tracing including upstream request bodies
    Trace,
    /// Verbose: model requests/responses, search details
    Debug,
    /// Standard: pipeline stages and HTTP requests
    Info,
    /// Quiet: only warnings and errors
    Warn,
    /// Minimal: only errors
    Error,
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VariantArg {
    /// Model-written answers: {"result": {"content": ...}}
    Prose,
    /// Raw search results: {"articles": [...]}
    Articles,
}

impl From<VariantArg> for ResponseVariant {
    fn from(arg: VariantArg) -> Self {
        match arg {
            VariantArg::Prose => ResponseVariant::Prose,
            VariantArg::Articles => ResponseVariant::Articles,
        }
    }
}

#[derive(Parser)]
#[command(name = "newsq")]
#[command(author, version, about = "newsq: answers news questions over HTTP", long_about = None)]
pub struct Cli {
    /// Config file (defaults to ~/.config/newsq/config.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Response variant (overrides config)
    #[arg(long, value_enum, global = true)]
    pub variant: Option<VariantArg>,

    /// Model to use (overrides config)
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    /// Enable debug logging (shorthand for --log-level debug)
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Write logs to file (JSON-lines format)
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default)
    Serve {
        /// Address to listen on (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Run one query through the pipeline and print the JSON response
    Ask {
        /// The question to ask
        query: String,
    },
    /// Show current configuration
    Config,
}

fn init_logging(cli: &Cli) -> Result<()> {
    // Resolve log level: --debug overrides --log-level
    let log_level = if cli.debug {
        LogLevel::Debug
    } else {
        cli.log_level
    };

    // RUST_LOG wins when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_filter()));

    if let Some(log_path) = &cli.log_file {
        let file = std::fs::File::create(log_path)
            .with_context(|| format!("Failed to create log file: {:?}", log_path))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::sync::Mutex::new(file)))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(variant) = cli.variant {
        config.variant = variant.into();
    }
    if let Some(model) = &cli.model {
        config.model.model = model.clone();
    }

    match &cli.command {
        Some(Commands::Config) => show_config(&config),
        Some(Commands::Ask { query }) => match config.variant {
            ResponseVariant::Prose => ask(build_news_pipeline(&config)?, query).await,
            ResponseVariant::Articles => ask(build_article_feed(&config), query).await,
        },
        Some(Commands::Serve { bind }) => {
            if let Some(bind) = bind {
                config.bind = bind.clone();
            }
            serve_configured(&config).await
        }
        None => serve_configured(&config).await,
    }
}

/// The search client, built once and shared by every request.
fn build_search(config: &Config) -> Arc<dyn SearchProvider> {
    let serp = config.serpapi_config();
    if !serp.has_key() {
        tracing::warn!("SERPAPI_API_KEY is not set; searches will fail until it is configured");
    }
    Arc::new(SerpApiSearch::new(serp))
}

fn build_news_pipeline(config: &Config) -> Result<NewsPipeline> {
    let provider = config
        .build_provider()
        .context("Language model is not configured")?;
    let synthesizer = Synthesizer::with_config(Arc::new(provider), config.synthesizer_config());
    Ok(NewsPipeline::new(synthesizer, build_search(config)))
}

fn build_article_feed(config: &Config) -> ArticleFeed {
    ArticleFeed::new(build_search(config))
}

async fn serve_configured(config: &Config) -> Result<()> {
    match config.variant {
        ResponseVariant::Prose => serve(build_news_pipeline(config)?, &config.bind).await,
        ResponseVariant::Articles => serve(build_article_feed(config), &config.bind).await,
    }
}

async fn serve<P>(pipeline: P, bind: &str) -> Result<()>
where
    P: Pipeline + 'static,
    P::Output: Envelope,
{
    let variant = pipeline.variant();
    let app = api::router(Arc::new(pipeline));

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!(%bind, %variant, "newsq listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("newsq stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}

async fn ask<P>(pipeline: P, query: &str) -> Result<()>
where
    P: Pipeline,
    P::Output: Envelope,
{
    let (status, body) = api::render(pipeline.run(query).await);
    println!("{}", serde_json::to_string_pretty(&body)?);
    if !status.is_success() {
        anyhow::bail!("Query failed with status {}", status.as_u16());
    }
    Ok(())
}

fn show_config(config: &Config) -> Result<()> {
    let path = Config::config_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "(unknown)".to_string());
    println!("# Default config file: {}\n", path);
    println!("{}", toml::to_string_pretty(&config.masked())?);
    Ok(())
}
