//! LLM provider implementations for Atlas.
//!
//! The only backend is an OpenAI-compatible chat-completions client, pointed
//! at OpenRouter by default. It implements `atlas_core::Provider`.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
