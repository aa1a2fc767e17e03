//! # Stepwise Core
//!
//! Domain types, capability traits, and error definitions for the stepwise
//! agent engine. This crate has **no runtime machinery of its own**; it
//! defines the model that the engine and its collaborators agree on.
//!
//! ## Design Philosophy
//!
//! The engine consumes two external capabilities, both defined as traits here:
//! - [`Provider`]: the reasoning capability (a language model call)
//! - [`ToolSet`]: the tool capability set (named, invocable actions)
//!
//! Implementations live in their respective crates, which keeps the
//! dependency graph pointing inward and makes mocking trivial in tests.

pub mod agent;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::AgentState;
pub use error::{AgentError, Error, ProviderError, Result, SessionError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{Conversation, ConversationId, Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use tool::{
    CompositeToolSet, TERMINATE_TOOL, Tool, ToolCall, ToolRegistry, ToolResult, ToolSet,
};
