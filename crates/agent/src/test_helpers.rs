//! Shared test helpers for agent tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use stepwise_core::error::{ProviderError, ToolError};
use stepwise_core::message::{Message, MessageToolCall};
use stepwise_core::provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
use stepwise_core::tool::{TERMINATE_TOOL, Tool, ToolCall, ToolRegistry, ToolResult, ToolSet};

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next scripted result. Once the script
/// is drained it keeps returning the repeated response if one was given,
/// otherwise an `ApiError`.
pub struct SequentialMockProvider {
    script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    repeat: Option<ProviderResponse>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self::from_results(responses.into_iter().map(Ok).collect())
    }

    pub fn from_results(results: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider that answers every call with the same text.
    pub fn repeating(text: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            repeat: Some(make_text_response(text)),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        match &self.repeat {
            // Fresh message ids on every reply
            Some(response) => Ok(make_text_response(&response.message.content)),
            None => Err(ProviderError::ApiError {
                status_code: 500,
                message: "SequentialMockProvider: script exhausted".into(),
            }),
        }
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Create a response with tool calls and optional thought content.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_tool_calls(thought, tool_calls),
        usage: None,
        model: "mock-model".into(),
    }
}

/// Helper to create a tool call.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall::new(name, serde_json::to_string(&args).unwrap())
}

/// Returns its `text` argument.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the text argument"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let text = arguments["text"].as_str().unwrap_or_default();
        Ok(ToolResult::ok(text))
    }
}

pub struct MockTerminateTool;

#[async_trait]
impl Tool for MockTerminateTool {
    fn name(&self) -> &str {
        TERMINATE_TOOL
    }

    fn description(&self) -> &str {
        "Finish the interaction"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let status = arguments["status"].as_str().unwrap_or("success");
        Ok(ToolResult::ok(format!(
            "The interaction has been completed with status: {status}"
        )))
    }
}

/// `echo` and `terminate`.
pub fn mock_tools() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(EchoTool));
    registry.register(Box::new(MockTerminateTool));
    registry
}

/// A tool set whose listing always fails.
pub struct FailingToolSet;

#[async_trait]
impl ToolSet for FailingToolSet {
    async fn list_available(&self) -> Result<Vec<ToolDefinition>, ToolError> {
        Err(ToolError::SourceUnavailable("mock source down".into()))
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        Err(ToolError::NotFound(call.name.clone()))
    }
}

/// A tool set whose catalogue can be changed between calls.
///
/// Every listed tool echoes its `text` argument.
pub struct DynamicToolSet {
    names: Mutex<Vec<String>>,
    fail_listing: Mutex<bool>,
    list_calls: Mutex<usize>,
}

impl DynamicToolSet {
    pub fn new(names: &[&str]) -> Self {
        Self {
            names: Mutex::new(names.iter().map(|s| s.to_string()).collect()),
            fail_listing: Mutex::new(false),
            list_calls: Mutex::new(0),
        }
    }

    pub fn set(&self, names: &[&str]) {
        *self.names.lock().unwrap() = names.iter().map(|s| s.to_string()).collect();
    }

    pub fn fail_listing(&self, fail: bool) {
        *self.fail_listing.lock().unwrap() = fail;
    }

    pub fn list_calls(&self) -> usize {
        *self.list_calls.lock().unwrap()
    }
}

#[async_trait]
impl ToolSet for DynamicToolSet {
    async fn list_available(&self) -> Result<Vec<ToolDefinition>, ToolError> {
        *self.list_calls.lock().unwrap() += 1;
        if *self.fail_listing.lock().unwrap() {
            return Err(ToolError::SourceUnavailable("dynamic source down".into()));
        }
        Ok(self
            .names
            .lock()
            .unwrap()
            .iter()
            .map(|name| ToolDefinition {
                name: name.clone(),
                description: format!("Remote tool {name}"),
                parameters: serde_json::json!({ "type": "object" }),
            })
            .collect())
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        if !self.names.lock().unwrap().contains(&call.name) {
            return Err(ToolError::NotFound(call.name.clone()));
        }
        let mut result = ToolResult::ok(call.arguments["text"].as_str().unwrap_or_default());
        result.call_id = call.id.clone();
        Ok(result)
    }
}
