//! newsq-tools: Search provider adapters for newsq
//!
//! - Web: SerpAPI-backed web and news search

pub mod web;

pub use web::{SerpApiConfig, SerpApiSearch, SERPAPI_KEY_VAR};
