//! News query orchestration for newsq.
//!
//! This crate provides:
//! - The fixed news-only policy (`policy`)
//! - The two-phase model protocol (`Synthesizer`)
//! - Query pipelines for the prose and article deployments (`NewsPipeline`, `ArticleFeed`)

pub mod pipeline;
pub mod policy;
mod query;
pub mod synthesizer;

pub use pipeline::{
    ArticleFeed, NewsPipeline, Pipeline, PipelineError, ProseAnswer, ResponseVariant, Stage,
};
pub use policy::REFUSAL;
pub use query::Query;
pub use synthesizer::{Decision, SynthesisError, Synthesizer, SynthesizerConfig, ToolInvocation};
