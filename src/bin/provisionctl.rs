//! # provisionctl
//!
//! Command-line entry point for the provisioning orchestrator: validate
//! and inspect the plan, apply it, verify the result, and tear the
//! environment back down.

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use provision_core::config::ConfigManager;
use provision_core::deployment::{self, build_plan};
use provision_core::orchestration::{Coordinator, RunContext, RunOutcome, ShellCommandRunner};
use provision_core::state_machine::NodeState;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::error;

#[derive(Parser)]
#[command(name = "provisionctl")]
#[command(about = "Dependency-ordered provisioning for the trading environment")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Environment to target (development, staging, production)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter configuration file
    Init {
        /// Directory to write provision.yaml into
        #[arg(default_value = "config")]
        dir: PathBuf,
    },

    /// Validate configuration and print the ordered stages
    Plan,

    /// Provision the environment
    Apply,

    /// Tear the environment down in reverse dependency order
    Destroy,

    /// Validate tools, session, and name availability before provisioning
    Precheck,

    /// Verify every provisioned system after an apply
    Postcheck,
}

#[tokio::main]
async fn main() {
    provision_core::logging::init_structured_logging();
    let cli = Cli::parse();

    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(error) => {
            error!(error = %error, "provisionctl failed");
            eprintln!("error: {error}");
            1
        }
    };
    process::exit(exit_code);
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Init { dir } = &cli.command {
        return init(dir);
    }

    let config_dir = cli
        .config_dir
        .unwrap_or_else(|| PathBuf::from("config"));
    let manager = ConfigManager::load_from_dir(&config_dir, &cli.environment)
        .context("loading configuration")?;
    let config = manager.config();
    let runner = Arc::new(ShellCommandRunner);

    match cli.command {
        // Handled before configuration is loaded
        Commands::Init { .. } => Ok(()),

        Commands::Plan => {
            let plan = build_plan(config, runner)?;
            let order = plan.graph.topological_sort()?;
            let features = config.enabled_features();
            println!("Stages in dependency order:");
            for id in order {
                let node = plan.graph.node(&id);
                let pruned = node
                    .and_then(|spec| spec.guard.as_ref())
                    .map(|guard| !guard.evaluate(&features))
                    .unwrap_or(false);
                let marker = if pruned { "  (skipped: feature off)" } else { "" };
                println!("  {id}{marker}");
            }
            Ok(())
        }

        Commands::Apply => {
            let plan = build_plan(config, runner)?;
            let coordinator = Coordinator::new(config.execution_options());
            let report = coordinator.run(&plan.graph, Arc::new(RunContext::new())).await;
            print!("{}", report.render_table());
            finish(&report)
        }

        Commands::Destroy => {
            let plan = build_plan(config, runner)?;
            let teardown = plan.teardown_graph()?;
            let coordinator = Coordinator::new(config.execution_options());
            let report = coordinator.run(&teardown, Arc::new(RunContext::new())).await;
            print!("{}", report.render_table());
            finish(&report)
        }

        Commands::Precheck => {
            let checks = deployment::precheck_specs(config);
            let report = deployment::run_checks("precheck", checks, runner).await;
            print!("{}", report.render_table());
            report.into_result()?;
            Ok(())
        }

        Commands::Postcheck => {
            let checks = deployment::postcheck_specs(config);
            let report = deployment::run_checks("postcheck", checks, runner).await;
            print!("{}", report.render_table());
            report.into_result()?;
            Ok(())
        }
    }
}

fn init(dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join("provision.yaml");
    if path.exists() {
        bail!("{} already exists, refusing to overwrite", path.display());
    }
    std::fs::write(&path, ConfigManager::starter_yaml())?;
    println!("Wrote starter configuration to {}", path.display());
    Ok(())
}

/// Convert the run outcome into the process exit contract: zero on full
/// success, an error naming the failed stage otherwise.
fn finish(report: &provision_core::orchestration::RunReport) -> anyhow::Result<()> {
    match &report.outcome {
        RunOutcome::Succeeded => Ok(()),
        RunOutcome::Failed { failed_nodes } => {
            let first = failed_nodes
                .first()
                .map(|id| id.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let reason = report
                .nodes
                .iter()
                .find(|node| node.state == NodeState::Failed && node.error.is_some())
                .and_then(|node| node.error.as_ref())
                .map(|error| error.to_string())
                .unwrap_or_default();
            Err(anyhow!("stage {first} failed: {reason}"))
        }
        RunOutcome::DeadlineExceeded { elapsed } => {
            Err(anyhow!("run deadline exceeded after {elapsed:?}"))
        }
    }
}
