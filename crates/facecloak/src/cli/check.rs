//! The `facecloak check` command: pre-flight reachability report.

use std::path::PathBuf;

use clap::Args;
use console::Style;
use facecloak_core::connectivity::ServiceStatus;
use facecloak_core::{components, Config, ConnectivityReport, OverallStatus};

use super::types::OutputFormat;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Print the report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Write the JSON report here
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub async fn execute(args: CheckArgs) -> anyhow::Result<()> {
    let config = Config::load()?;

    let store = components::object_store(&config)?;
    let remote = components::remote_anonymizer(&config).await?;
    let gate = components::connectivity_gate(&config, store, remote)?;
    let report = gate.check().await;

    print_report(&report);

    if args.json || args.output.is_some() {
        let mut output =
            super::open_output(args.output.as_deref(), Some(OutputFormat::Json), &config)?;
        output.write(&report)?;
    }

    if report.overall == OverallStatus::Offline {
        anyhow::bail!("{}", report.message());
    }
    Ok(())
}

fn print_report(report: &ConnectivityReport) {
    let overall = match report.overall {
        OverallStatus::Healthy => Style::new().for_stderr().green(),
        OverallStatus::Degraded => Style::new().for_stderr().yellow(),
        OverallStatus::Offline => Style::new().for_stderr().red(),
    };

    eprintln!();
    eprintln!("  Status: {}", overall.apply_to(report.overall).bold());
    eprintln!("  {}", report.message());
    eprintln!();
    eprintln!("{}", service_line("Database", &report.database));
    eprintln!("{}", service_line("API", &report.api));
    eprintln!();
}

fn service_line(name: &str, status: &ServiceStatus) -> String {
    let (mark, style) = if status.connected {
        ("✓", Style::new().for_stderr().green())
    } else {
        ("✗", Style::new().for_stderr().red())
    };

    let mut line = format!(
        "  {} {:<9}{:>6}ms",
        style.apply_to(mark),
        name,
        status.latency_ms
    );
    if let Some(endpoint) = &status.endpoint {
        line.push_str(&format!("  {endpoint}"));
    }
    if let Some(error) = &status.error {
        line.push_str(&format!("  ({error})"));
    }
    line
}
