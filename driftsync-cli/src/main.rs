//! driftsyncd - the driftsync daemon.
//!
//! Loads a JSON seed config, recovers any state a previous instance left
//! behind, then runs the supervisor and the log janitor until Ctrl-C.

mod config;
mod error;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use driftsync::admission::GlobalJobLimiter;
use driftsync::catalog::Catalog;
use driftsync::executor::ExecContext;
use driftsync::janitor::run_log_janitor;
use driftsync::logging::init_logging;
use driftsync::ports::PortPool;
use driftsync::recovery::recover_dangling_runs;
use driftsync::registry::ProcessRegistry;
use driftsync::supervisor::Supervisor;

use config::SeedConfig;
use error::CliError;

#[derive(Parser)]
#[command(name = "driftsyncd")]
#[command(version = driftsync::VERSION)]
#[command(about = "Rule-driven sync orchestration daemon", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon against a seed configuration
    Run {
        /// Path to the JSON seed config (settings, limit groups, rules)
        #[arg(long)]
        config: PathBuf,

        /// Transfer-tool binary to drive (must be on PATH)
        #[arg(long, default_value = driftsync::executor::DEFAULT_TRANSFER_TOOL)]
        tool: String,
    },

    /// Validate a seed configuration and exit
    Check {
        /// Path to the JSON seed config
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run { config, tool } => run_daemon(config, tool),
        Commands::Check { config } => run_check(config),
    };
    if let Err(e) = result {
        e.exit();
    }
}

fn run_check(config_path: PathBuf) -> Result<(), CliError> {
    let seed = SeedConfig::load(&config_path)?;
    let rules = seed.rules.len();
    let groups = seed.limit_groups.len();

    let runtime = tokio::runtime::Runtime::new().map_err(CliError::Io)?;
    runtime.block_on(seed.into_catalog())?;

    println!("Configuration OK: {} rule(s), {} limit group(s)", rules, groups);
    Ok(())
}

fn run_daemon(config_path: PathBuf, tool: String) -> Result<(), CliError> {
    let seed = SeedConfig::load(&config_path)?;
    let _logging = init_logging(seed.log_dir())?;

    let runtime = tokio::runtime::Runtime::new().map_err(CliError::Io)?;
    runtime.block_on(async move {
        let catalog = seed.into_catalog().await?;
        let settings = catalog.runtime_settings().await?;

        let dyn_catalog: Arc<dyn Catalog> = catalog.clone();
        recover_dangling_runs(&dyn_catalog).await?;

        let mut ctx = ExecContext::new(
            catalog,
            Arc::new(PortPool::new(settings.rc_port_start, settings.rc_port_end)),
            Arc::new(GlobalJobLimiter::new(settings.global_max_jobs)),
            Arc::new(ProcessRegistry::new()),
        );
        ctx.tool = tool;
        let ctx = Arc::new(ctx);

        let root = CancellationToken::new();
        let supervisor = Arc::new(Supervisor::new(ctx.clone(), root.clone()));

        let janitor = tokio::spawn(run_log_janitor(
            ctx.catalog.clone(),
            root.child_token(),
        ));
        let sup_task = {
            let supervisor = supervisor.clone();
            tokio::spawn(async move { supervisor.run().await })
        };

        info!(version = driftsync::VERSION, "driftsyncd started");
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "signal handler failed");
        }
        info!("shutting down");
        root.cancel();
        let _ = sup_task.await;
        let _ = janitor.await;
        Ok::<(), CliError>(())
    })
}
