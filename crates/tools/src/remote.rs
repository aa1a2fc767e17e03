//! Remote tool catalogue over HTTP.
//!
//! The catalogue may add or drop tools at any time; agents re-list it on
//! their refresh interval.
//!
//! ```text
//! GET  {base}/tools          -> {"tools": [{"name", "description", "parameters"}]}
//! POST {base}/tools/{name}   <- {"id", "arguments"}
//!                            -> {"output", "success"}
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use stepwise_core::error::ToolError;
use stepwise_core::provider::ToolDefinition;
use stepwise_core::tool::{ToolCall, ToolResult, ToolSet};
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct Catalogue {
    #[serde(default)]
    tools: Vec<ToolDefinition>,
}

#[derive(Debug, Serialize)]
struct CallBody<'a> {
    id: &'a str,
    arguments: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CallReply {
    output: String,
    #[serde(default = "default_success")]
    success: bool,
}

fn default_success() -> bool {
    true
}

pub struct HttpToolSource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpToolSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ToolError::SourceUnavailable(format!("HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ToolSet for HttpToolSource {
    async fn list_available(&self) -> Result<Vec<ToolDefinition>, ToolError> {
        let url = format!("{}/tools", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ToolError::SourceUnavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ToolError::SourceUnavailable(format!(
                "{url} returned {}",
                response.status().as_u16()
            )));
        }

        let catalogue: Catalogue = response
            .json()
            .await
            .map_err(|e| ToolError::SourceUnavailable(format!("bad catalogue: {e}")))?;
        debug!(source = %self.base_url, count = catalogue.tools.len(), "Listed remote tools");
        Ok(catalogue.tools)
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        let url = format!("{}/tools/{}", self.base_url, call.name);
        let body = CallBody {
            id: &call.id,
            arguments: &call.arguments,
        };
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: call.name.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status().as_u16();
        if status == 404 {
            return Err(ToolError::NotFound(call.name.clone()));
        }
        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(tool = %call.name, status, "Remote tool call failed");
            return Err(ToolError::ExecutionFailed {
                tool_name: call.name.clone(),
                reason: format!("HTTP {status}: {text}"),
            });
        }

        let reply: CallReply = response.json().await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: call.name.clone(),
            reason: format!("bad reply: {e}"),
        })?;
        Ok(ToolResult {
            call_id: call.id.clone(),
            success: reply.success,
            output: reply.output,
            data: None,
        })
    }
}
