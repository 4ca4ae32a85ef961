//! # Atlas Core
//!
//! Domain types, traits, and error definitions for the Atlas crypto chat agent.
//! This crate has **zero framework dependencies**; it defines the domain model
//! that the provider, tool, agent, and gateway crates implement against.
//!
//! ## Design Philosophy
//!
//! The two remote collaborators (chat model, conversion lookup) sit behind
//! traits defined here. Implementations live in their respective crates, so
//! the orchestrator can be driven by scripted stubs in tests.

pub mod error;
pub mod knowledge;
pub mod memory;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use knowledge::{InstructionBlock, KnowledgeSources};
pub use memory::{ConversationMemory, Turn};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolChoice, ToolDefinition};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
