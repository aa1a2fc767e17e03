//! Built-in tool implementations for stepwise.
//!
//! The agent engine only needs the reserved `terminate` tool. The file,
//! shell and web tools give a local agent something useful to do out of
//! the box, and [`HttpToolSource`] plugs in a catalogue that can change
//! while the agent runs.

pub mod file_ops;
pub mod remote;
pub mod shell;
pub mod terminate;
pub mod web_fetch;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use stepwise_config::ToolsConfig;
use stepwise_core::error::ToolError;
use stepwise_core::tool::{ToolRegistry, ToolSet};
use tracing::debug;

pub use file_ops::{FileReadTool, FileWriteTool};
pub use remote::HttpToolSource;
pub use shell::ShellTool;
pub use terminate::TerminateTool;
pub use web_fetch::WebFetchTool;

/// `terminate` plus the file tools, confined to `workdir`.
pub fn default_registry(workdir: impl Into<PathBuf>) -> ToolRegistry {
    let workdir = workdir.into();
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(TerminateTool));
    registry.register(Box::new(FileReadTool::new(workdir.clone())));
    registry.register(Box::new(FileWriteTool::new(workdir)));
    registry
}

/// The default registry plus whichever shell and web tools `config` enables.
pub fn registry_from_config(
    config: &ToolsConfig,
    workdir: impl Into<PathBuf>,
) -> Result<ToolRegistry, ToolError> {
    let workdir = workdir.into();
    let mut registry = default_registry(workdir.clone());
    if config.shell_enabled {
        registry.register(Box::new(
            ShellTool::new(workdir, config.shell_allowlist.clone())
                .with_timeout(Duration::from_secs(config.shell_timeout_secs)),
        ));
    }
    if config.web_fetch_enabled {
        registry.register(Box::new(WebFetchTool::new(
            Duration::from_secs(config.web_timeout_secs),
            config.web_max_bytes,
        )?));
    }
    debug!(tools = ?registry.names(), "Built tool registry");
    Ok(registry)
}

/// The configured remote catalogue, if any.
pub fn remote_source(config: &ToolsConfig) -> Result<Option<Arc<dyn ToolSet>>, ToolError> {
    let Some(url) = &config.remote_url else {
        return Ok(None);
    };
    let source = HttpToolSource::new(url, Duration::from_secs(config.web_timeout_secs))?;
    Ok(Some(Arc::new(source)))
}
