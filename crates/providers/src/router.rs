//! Provider selection: builds the configured reasoning backend.

use std::sync::Arc;
use stepwise_config::ProviderConfig;
use stepwise_core::error::ProviderError;
use stepwise_core::provider::Provider;
use tracing::debug;

use crate::openai_compat::OpenAiCompatProvider;

/// Build the provider described by configuration.
///
/// Hosted backends require an API key; local runtimes do not.
pub fn build_from_config(config: &ProviderConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let base_url = config
        .api_url
        .clone()
        .unwrap_or_else(|| default_base_url(&config.name));

    let api_key = match (&config.api_key, is_local(&config.name)) {
        (Some(key), _) => key.clone(),
        (None, true) => config.name.clone(),
        (None, false) => {
            return Err(ProviderError::NotConfigured(format!(
                "no API key for provider '{}' (set STEPWISE_API_KEY or provider.api_key)",
                config.name
            )));
        }
    };

    debug!(provider = %config.name, url = %base_url, "Building provider");
    Ok(Arc::new(OpenAiCompatProvider::new(
        &config.name,
        base_url,
        api_key,
    )?))
}

fn is_local(provider_name: &str) -> bool {
    matches!(provider_name, "ollama" | "vllm" | "llamacpp" | "llama.cpp")
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "dashscope" => "https://dashscope.aliyuncs.com/compatible-mode/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => "https://api.openai.com/v1".into(),
    }
}
