pub mod config_cmd;
pub mod provider;
pub mod run;
pub mod stream;
pub mod tools;

use std::path::PathBuf;
use std::sync::Arc;
use stepwise_agent::AgentTemplate;
use stepwise_config::AppConfig;
use stepwise_core::provider::Provider;
use tracing::debug;

pub(crate) fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Build the configured provider, explaining how to set a key when one is missing.
pub(crate) fn build_provider(
    config: &AppConfig,
) -> Result<Arc<dyn Provider>, Box<dyn std::error::Error>> {
    let provider = stepwise_providers::build_from_config(&config.provider).map_err(|e| {
        eprintln!();
        eprintln!("  ERROR: {e}");
        eprintln!();
        eprintln!("  Set STEPWISE_API_KEY (or OPENAI_API_KEY), or add it to:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        e
    })?;
    Ok(provider)
}

/// Assemble the agent template shared by `run` and `stream`.
pub(crate) fn build_template(
    config: &AppConfig,
    workdir: PathBuf,
) -> Result<AgentTemplate, Box<dyn std::error::Error>> {
    let provider = build_provider(config)?;
    template_with(config, provider, workdir)
}

/// Tools and remote source from config around an already-built provider.
pub(crate) fn template_with(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
    workdir: PathBuf,
) -> Result<AgentTemplate, Box<dyn std::error::Error>> {
    debug!(
        provider = %config.provider.name,
        model = %config.provider.model,
        workdir = %workdir.display(),
        remote_tools = ?config.tools.remote_url,
        "Building agent template"
    );
    let tools = Arc::new(stepwise_tools::registry_from_config(&config.tools, workdir)?);
    let mut template = AgentTemplate::from_config(config, provider, tools);
    if let Some(remote) = stepwise_tools::remote_source(&config.tools)? {
        template = template.with_remote_tools(remote);
    }
    Ok(template)
}
