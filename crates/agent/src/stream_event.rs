//! Observable events of a streaming run.
//!
//! Per session the order is:
//! - `stream-info`   : session metadata, once, before any async work
//! - `thought`       : reasoning commentary
//! - `tool-start`    : a tool call is about to run
//! - `tool-args`     : its arguments
//! - `tool-result`   : its result text
//! - `final-response` / `error`: exactly one
//! - `complete`      : end-of-stream sentinel (never sent after a cancel)

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    /// Session metadata.
    #[serde(rename_all = "camelCase")]
    StreamInfo {
        session_id: String,
        conversation_id: String,
        message: String,
        /// Milliseconds since the Unix epoch.
        timestamp: i64,
    },

    Thought { content: String },

    ToolStart { id: String, name: String },

    ToolArgs {
        id: String,
        name: String,
        arguments: String,
    },

    ToolResult {
        id: String,
        name: String,
        output: String,
        success: bool,
    },

    FinalResponse { content: String },

    Error { message: String },

    Complete,
}

impl StreamEvent {
    /// Wire name of this event's kind.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StreamInfo { .. } => "stream-info",
            Self::Thought { .. } => "thought",
            Self::ToolStart { .. } => "tool-start",
            Self::ToolArgs { .. } => "tool-args",
            Self::ToolResult { .. } => "tool-result",
            Self::FinalResponse { .. } => "final-response",
            Self::Error { .. } => "error",
            Self::Complete => "complete",
        }
    }

    /// Whether this event ends the run's output (`final-response` or `error`).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FinalResponse { .. } | Self::Error { .. })
    }
}
