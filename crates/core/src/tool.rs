//! Tool capability set: the abstraction over agent actions.
//!
//! A single [`Tool`] is one named action with a JSON-schema'd argument
//! payload. A [`ToolSet`] is what the engine actually consumes: something
//! that can enumerate the tools on offer *right now* and execute a call by
//! name. The set may be static ([`ToolRegistry`]) or change between calls
//! (a remotely discovered catalogue).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// Reserved tool name: executing it moves the agent to its FINISHED state.
pub const TERMINATE_TOOL: &str = "terminate";

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as an opaque JSON value
    pub arguments: serde_json::Value,
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            call_id: String::new(),
            success: true,
            output: output.into(),
            data: None,
        }
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "terminate", "search").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// The contract the engine requires from its tools.
///
/// `list_available` may return a different set on every call; the engine
/// re-reads it before each reasoning step.
#[async_trait]
pub trait ToolSet: Send + Sync {
    /// Enumerate the tools currently on offer.
    async fn list_available(&self) -> std::result::Result<Vec<ToolDefinition>, ToolError>;

    /// Execute a named tool.
    async fn execute(&self, call: &ToolCall) -> std::result::Result<ToolResult, ToolError>;
}

/// A static registry of in-process tools.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// All tool definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolSet for ToolRegistry {
    async fn list_available(&self) -> std::result::Result<Vec<ToolDefinition>, ToolError> {
        Ok(self.definitions())
    }

    async fn execute(&self, call: &ToolCall) -> std::result::Result<ToolResult, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        let mut result = tool.execute(call.arguments.clone()).await?;
        result.call_id = call.id.clone();
        Ok(result)
    }
}

/// Local tools and a dynamic source offered to the model as one set.
///
/// Execution routes a call to the local set when it declares the name,
/// otherwise to the remote set.
pub struct CompositeToolSet {
    local: Arc<dyn ToolSet>,
    remote: Arc<dyn ToolSet>,
}

impl CompositeToolSet {
    pub fn new(local: Arc<dyn ToolSet>, remote: Arc<dyn ToolSet>) -> Self {
        Self { local, remote }
    }
}

#[async_trait]
impl ToolSet for CompositeToolSet {
    async fn list_available(&self) -> std::result::Result<Vec<ToolDefinition>, ToolError> {
        let mut defs = self.local.list_available().await?;
        match self.remote.list_available().await {
            Ok(remote) => {
                for def in remote {
                    if !defs.iter().any(|d| d.name == def.name) {
                        defs.push(def);
                    }
                }
            }
            Err(e) => warn!(error = %e, "Remote tool source unavailable, offering local tools only"),
        }
        Ok(defs)
    }

    async fn execute(&self, call: &ToolCall) -> std::result::Result<ToolResult, ToolError> {
        let local = self.local.list_available().await?;
        if local.iter().any(|d| d.name == call.name) {
            self.local.execute(call).await
        } else {
            self.remote.execute(call).await
        }
    }
}
