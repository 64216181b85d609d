//! newsq-core: Core types and traits for newsq
//!
//! This crate provides the foundational types shared by the model client,
//! the search adapter and the query pipeline.

pub mod error;
pub mod message;
pub mod provider;
pub mod search;
pub mod tool;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::Error;
pub use message::{Message, Role, ToolCall, Usage};
pub use provider::{CompletionRequest, CompletionResponse, FinishReason, Provider};
pub use search::{SearchProvider, SearchResult};
pub use tool::{PropertySchema, ToolDefinition, ToolParameters};

pub type Result<T> = std::result::Result<T, Error>;
