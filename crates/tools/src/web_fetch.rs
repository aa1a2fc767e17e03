//! Web fetch tool: GET a page and hand its body to the model.

use async_trait::async_trait;
use std::time::Duration;
use stepwise_core::error::ToolError;
use stepwise_core::tool::{Tool, ToolResult};
use tracing::{debug, warn};

pub struct WebFetchTool {
    client: reqwest::Client,
    max_bytes: usize,
}

impl WebFetchTool {
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("stepwise/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "web_fetch".into(),
                reason: format!("HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            max_bytes: max_bytes.max(1),
        })
    }
}

/// Cut `body` to at most `max_bytes`, on a char boundary.
fn truncate(mut body: String, max_bytes: usize) -> String {
    if body.len() <= max_bytes {
        return body;
    }
    let mut end = max_bytes;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body.truncate(end);
    body.push_str("\n[truncated]");
    body
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a web page over HTTP(S) and return its content."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "URL of the page to fetch"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let url = arguments["url"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'url' argument".into()))?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::InvalidArguments(
                "URL must start with http:// or https://".into(),
            ));
        }

        debug!(url, "Fetching web page");
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url, error = %e, "Web fetch failed");
                return Ok(ToolResult {
                    call_id: String::new(),
                    success: false,
                    output: format!("Error fetching web page: {e}"),
                    data: None,
                });
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => truncate(body, self.max_bytes),
            Err(e) => format!("Error reading response body: {e}"),
        };

        if status.is_success() {
            Ok(ToolResult::ok(body))
        } else {
            Ok(ToolResult {
                call_id: String::new(),
                success: false,
                output: format!("HTTP {}: {body}", status.as_u16()),
                data: None,
            })
        }
    }
}
