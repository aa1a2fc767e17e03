//! `stepwise provider`: check that the configured backend is reachable.

use stepwise_core::provider::Provider;

/// Model ids printed before the list is summarised.
const MAX_LISTED: usize = 20;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let provider = super::build_provider(&config)?;

    let report = check(provider.as_ref(), &config.provider.model).await;
    print!("{}", report.render());
    if !report.reachable {
        return Err(format!("provider '{}' is not reachable", report.name).into());
    }
    Ok(())
}

pub(crate) struct ProviderReport {
    name: String,
    model: String,
    reachable: bool,
    models: Vec<String>,
    error: Option<String>,
}

/// Health check first; the model list is only fetched from a reachable backend.
pub(crate) async fn check(provider: &dyn Provider, model: &str) -> ProviderReport {
    let (reachable, mut error) = match provider.health_check().await {
        Ok(ok) => (ok, None),
        Err(e) => (false, Some(e.to_string())),
    };

    let mut models = Vec::new();
    if reachable {
        match provider.list_models().await {
            Ok(listed) => models = listed,
            Err(e) => error = Some(e.to_string()),
        }
    }

    ProviderReport {
        name: provider.name().to_string(),
        model: model.to_string(),
        reachable,
        models,
        error,
    }
}

impl ProviderReport {
    fn render(&self) -> String {
        let mut out = String::from("🩺 Provider check\n\n");
        out.push_str(&format!("  Provider:  {}\n", self.name));
        out.push_str(&format!(
            "  Reachable: {}\n",
            if self.reachable { "yes" } else { "no" }
        ));

        let model_state = if self.models.is_empty() {
            "not verified"
        } else if self.models.iter().any(|m| m == &self.model) {
            "available"
        } else {
            "NOT in the model list"
        };
        out.push_str(&format!("  Model:     {} ({model_state})\n", self.model));

        if !self.models.is_empty() {
            out.push_str(&format!("  Models:    {} listed\n", self.models.len()));
            for id in self.models.iter().take(MAX_LISTED) {
                out.push_str(&format!("    - {id}\n"));
            }
            if self.models.len() > MAX_LISTED {
                out.push_str(&format!("    ... and {} more\n", self.models.len() - MAX_LISTED));
            }
        }
        if let Some(error) = &self.error {
            out.push_str(&format!("  Error:     {error}\n"));
        }
        out
    }
}
