use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use vnstock_mcp_launcher::config::LauncherConfig;
use vnstock_mcp_launcher::launcher::Launcher;
use vnstock_mcp_launcher::python_env::EnvironmentReport;
use vnstock_mcp_launcher::runner::SystemRunner;
use vnstock_mcp_launcher::supervisor::signals::OsSignals;
use vnstock_mcp_launcher::supervisor::Supervisor;
use vnstock_mcp_launcher::LauncherError;

/// MCP server for Vietnamese stock market data (vnstock).
///
/// Without flags: checks Python, installs missing packages, then runs the
/// server on stdio until it exits or SIGINT/SIGTERM arrives.
#[derive(Parser, Debug)]
#[command(name = "vnstock-mcp-server", version, about)]
struct Cli {
    /// Check Python and the required packages, then exit
    #[arg(long)]
    test: bool,

    /// Print the --test report as JSON
    #[arg(long, requires = "test")]
    json: bool,

    /// Install every required Python package, then exit
    #[arg(long, conflicts_with = "test")]
    install_deps: bool,

    /// Launcher config file (default: config/launcher.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    // stdout carries the MCP stream; every log line goes to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => match e.downcast_ref::<LauncherError>() {
            Some(le) => {
                tracing::error!("[{}] {}", le.error_code(), le);
                if le.is_verification_failure() {
                    tracing::info!("Run with --test for a full environment report");
                }
                le.exit_code()
            }
            None => {
                tracing::error!("{:#}", e);
                1
            }
        },
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = LauncherConfig::load(cli.config.as_deref())?;
    let launcher = Launcher::new(config, SystemRunner);
    tracing::debug!("Package root: {}", launcher.package_root().display());

    if cli.test {
        let report = launcher.check().await;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }
        return Ok(report.exit_code());
    }

    if cli.install_deps {
        launcher.install_dependencies().await?;
        return Ok(0);
    }

    let command = launcher.prepare().await?;
    let mut signals = OsSignals::install().context("Failed to install signal handlers")?;
    let mut supervisor = Supervisor::new(launcher.config().grace_period());
    let outcome = supervisor.run(&command, &mut signals).await?;
    if outcome.force_killed {
        tracing::warn!("Server was killed after the grace period");
    }
    Ok(outcome.exit_code())
}

fn print_report(report: &EnvironmentReport) {
    match (&report.interpreter, &report.python_version) {
        (Some(python), Some(version)) => {
            let mark = match (report.version_ok, report.allow_incompatible) {
                (true, _) => "ok",
                (false, true) => "unsupported, allowed",
                (false, false) => "UNSUPPORTED",
            };
            println!("Python:  {} ({}) [{}]", python, version, mark);
        }
        (Some(python), None) => println!("Python:  {} (unknown version)", python),
        (None, _) => println!("Python:  not found"),
    }
    for pkg in &report.packages {
        let mark = if pkg.importable { "ok" } else { "MISSING" };
        println!("  {:<24} [{}]", pkg.requirement, mark);
    }
    for warning in &report.warnings {
        println!("Warning: {}", warning);
    }
    if let Some(err) = &report.error {
        println!("Error:   {}", err);
    }
    println!("{}", if report.is_ready() { "Environment ready" } else { "Environment NOT ready" });
}
