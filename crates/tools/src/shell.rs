//! Shell tool: run a command in the working directory.
//!
//! Commands go through `sh -c` (`cmd /C` on Windows), start in the agent's
//! working directory and are killed when the timeout elapses.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use stepwise_core::error::ToolError;
use stepwise_core::tool::{Tool, ToolResult};
use tokio::process::Command;
use tracing::{debug, warn};

pub struct ShellTool {
    workdir: PathBuf,
    /// If non-empty, only these first words are allowed.
    allowlist: Vec<String>,
    timeout: Duration,
}

impl ShellTool {
    pub fn new(workdir: impl Into<PathBuf>, allowlist: Vec<String>) -> Self {
        Self {
            workdir: workdir.into(),
            allowlist,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn is_allowed(&self, command: &str) -> bool {
        if self.allowlist.is_empty() {
            return true;
        }
        let base = command.split_whitespace().next().unwrap_or("");
        self.allowlist.iter().any(|a| a == base)
    }

    fn command(&self, line: &str) -> Command {
        let mut command = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", line]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", line]);
            c
        };
        command
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

/// Stdout, then stderr lines prefixed `ERROR: `, then the exit code on failure.
fn render_output(stdout: &[u8], stderr: &[u8], exit_code: Option<i32>) -> String {
    let mut text = String::from_utf8_lossy(stdout).trim_end().to_string();
    for line in String::from_utf8_lossy(stderr).lines() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str("ERROR: ");
        text.push_str(line);
    }
    if exit_code != Some(0) {
        if !text.is_empty() {
            text.push('\n');
        }
        match exit_code {
            Some(code) => text.push_str(&format!("Command execution failed with exit code: {code}")),
            None => text.push_str("Command terminated by signal"),
        }
    }
    text
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a command in the terminal and return its output."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Command to execute in the terminal"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let line = arguments["command"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;

        if !self.is_allowed(line) {
            return Err(ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: format!(
                    "command '{}' is not in the allowlist",
                    line.split_whitespace().next().unwrap_or("")
                ),
            });
        }

        debug!(command = %line, workdir = %self.workdir.display(), "Executing shell command");
        let output = match tokio::time::timeout(self.timeout, self.command(line).output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: self.name().into(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(command = %line, timeout_secs = self.timeout.as_secs(), "Shell command timed out");
                return Ok(ToolResult {
                    call_id: String::new(),
                    success: false,
                    output: format!("Command timed out after {}s", self.timeout.as_secs()),
                    data: None,
                });
            }
        };

        let success = output.status.success();
        if !success {
            warn!(command = %line, exit_code = ?output.status.code(), "Shell command failed");
        }
        Ok(ToolResult {
            call_id: String::new(),
            success,
            output: render_output(&output.stdout, &output.stderr, output.status.code()),
            data: None,
        })
    }
}
