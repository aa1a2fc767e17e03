//! Terminate tool: lets the model end the interaction.
//!
//! Executing it does nothing by itself; the agent recognises the reserved
//! name after the act phase and moves to FINISHED.

use async_trait::async_trait;
use stepwise_core::error::ToolError;
use stepwise_core::tool::{TERMINATE_TOOL, Tool, ToolResult};

pub struct TerminateTool;

#[async_trait]
impl Tool for TerminateTool {
    fn name(&self) -> &str {
        TERMINATE_TOOL
    }

    fn description(&self) -> &str {
        "Terminate the interaction when the request is met OR if the assistant cannot proceed \
         further with the task. When you have finished all the tasks, call this tool to end the work."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "status": {
                    "type": "string",
                    "description": "The finish status of the interaction",
                    "enum": ["success", "failure"]
                }
            },
            "required": ["status"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let status = arguments["status"].as_str().unwrap_or("success");
        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: format!("The interaction has been completed with status: {status}"),
            data: Some(serde_json::json!({ "status": status })),
        })
    }
}
