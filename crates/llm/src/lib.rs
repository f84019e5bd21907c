//! sitegen LLM provider infrastructure adapter.
//!
//! Implements the [`pipeline::LlmProvider`] trait for Anthropic's Messages
//! API. Additional providers are added as new types in this crate without any
//! changes to the `pipeline` crate.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, request formatting and response parsing
//! live here. The [`pipeline`] crate sees only [`pipeline::LlmProvider`].
//! There is no retry: a failed call surfaces as [`pipeline::LlmError`] and the
//! calling stage decides whether to fall back.

mod anthropic;
mod types;

pub use anthropic::{AnthropicProvider, ANTHROPIC_API_URL, ANTHROPIC_VERSION, DEFAULT_MODEL};
