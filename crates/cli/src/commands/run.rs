//! `stepwise run`: one synchronous run, trace printed on completion.

use std::path::PathBuf;
use stepwise_agent::RunReport;

pub async fn run(
    message: &str,
    workdir: PathBuf,
    max_steps: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config()?;
    if let Some(max) = max_steps {
        config.agent.max_steps = max.max(1);
    }
    let template = super::build_template(&config, workdir)?;

    let mut agent = template.instantiate();
    eprint!("  Thinking...");
    let report = agent.run(message).await?;
    eprint!("\r              \r");

    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    println!("{}", report.text());
    eprintln!();
    eprintln!("  [{}] {} step(s)", report.outcome.label(), report.steps);
}
