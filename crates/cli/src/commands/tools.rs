//! `stepwise tools`: List the tools an agent would be offered.

use stepwise_core::tool::ToolRegistry;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let registry = stepwise_tools::registry_from_config(&config.tools, std::env::current_dir()?)?;
    print!("{}", render(&registry));
    if let Some(url) = &config.tools.remote_url {
        println!();
        println!("  Remote catalogue: {url} (re-listed every {} steps)", config.agent.tool_refresh_interval);
    }
    Ok(())
}

fn render(registry: &ToolRegistry) -> String {
    let mut out = String::from("🔧 Built-in tools\n\n");
    for def in registry.definitions() {
        out.push_str(&format!("  {:<12} {}\n", def.name, def.description));
    }
    out
}
