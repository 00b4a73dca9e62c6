//! prism-core - provider adapters and streaming plumbing for Prism
//!
//! This crate provides:
//! - Streaming adapters for OpenAI, Anthropic and Google Gemini
//! - A model router dispatching a selector label to one adapter
//! - SSE decoding and delta-to-cumulative accumulation
//! - The panel binding that renders each snapshot as a full replacement

pub mod accumulate;
pub mod binding;
pub mod error;
pub mod providers;
pub mod sse;

// Re-export main types for convenience
pub use binding::{BindSummary, ResponsePanel, bind};
pub use error::{Error, Result};
pub use providers::{
    AnthropicProvider, GoogleProvider, ModelRouter, OpenAiProvider, ProviderSettings, Selector,
    StreamingTextSource, SYSTEM_INSTRUCTION, TextStream, build_http_client,
};
