//! File tools scoped to one working directory.
//!
//! Both tools take a relative `file_name`; absolute paths and `..`
//! components are rejected so the model cannot escape the directory.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use stepwise_core::error::ToolError;
use stepwise_core::tool::{Tool, ToolResult};
use tracing::debug;

/// Resolve `file_name` inside `root`, refusing anything that would leave it.
fn resolve(root: &Path, tool_name: &str, file_name: &str) -> Result<PathBuf, ToolError> {
    let relative = Path::new(file_name);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if file_name.trim().is_empty() || escapes {
        return Err(ToolError::ExecutionFailed {
            tool_name: tool_name.into(),
            reason: format!("'{file_name}' is outside the working directory"),
        });
    }
    Ok(root.join(relative))
}

fn file_name_arg<'a>(arguments: &'a serde_json::Value) -> Result<&'a str, ToolError> {
    arguments["file_name"]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments("Missing 'file_name' argument".into()))
}

pub struct FileReadTool {
    root: PathBuf,
}

impl FileReadTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
        }
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read the content of a file in the working directory."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_name": {
                    "type": "string",
                    "description": "Name of the file to read"
                }
            },
            "required": ["file_name"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let file_name = file_name_arg(&arguments)?;
        let path = resolve(&self.root, self.name(), file_name)?;

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(ToolResult::ok(content)),
            Err(e) => Ok(ToolResult {
                call_id: String::new(),
                success: false,
                output: format!("Error reading file: {e}"),
                data: None,
            }),
        }
    }
}

pub struct FileWriteTool {
    root: PathBuf,
}

impl FileWriteTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
        }
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write content to a file in the working directory, creating it if needed."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_name": {
                    "type": "string",
                    "description": "Name of the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                }
            },
            "required": ["file_name", "content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let file_name = file_name_arg(&arguments)?;
        let content = arguments["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;
        let path = resolve(&self.root, self.name(), file_name)?;

        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return Ok(ToolResult {
                    call_id: String::new(),
                    success: false,
                    output: format!("Error writing file: {e}"),
                    data: None,
                });
            }
        }

        match tokio::fs::write(&path, content).await {
            Ok(()) => {
                debug!(file = %file_name, bytes = content.len(), "Wrote file");
                Ok(ToolResult {
                    call_id: String::new(),
                    success: true,
                    output: format!("File written successfully: {file_name}"),
                    data: Some(serde_json::json!({ "bytes": content.len() })),
                })
            }
            Err(e) => Ok(ToolResult {
                call_id: String::new(),
                success: false,
                output: format!("Error writing file: {e}"),
                data: None,
            }),
        }
    }
}
