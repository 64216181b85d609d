//! newsq-providers: Language model provider implementations for newsq
//!
//! This crate provides implementations of the Provider trait for
//! OpenAI-compatible chat-completion APIs (OpenAI, Groq, local servers).

pub mod openai;

pub use openai::{OpenAIProvider, GROQ_BASE_URL, OPENAI_BASE_URL};
