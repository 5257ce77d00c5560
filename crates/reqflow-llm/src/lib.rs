//! Optional LLM capabilities for the reqflow pipeline.
//!
//! Provides the `TextGenerator` and `Embedder` capability traits with null and
//! timeout-bounded implementations, the `ProviderAdapter` trait, a Gemini
//! adapter, and `LlmClient` for routing requests through middleware.

mod capability;
mod client;
mod gemini;
mod provider;
mod types;

pub use capability::*;
pub use client::*;
pub use gemini::GeminiAdapter;
pub use provider::*;
pub use types::*;
