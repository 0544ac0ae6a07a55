//! # backup-data-gen
//!
//! Generate synthetic backup data on remote application containers.
//!
//! For every selected job the tool draws a random size distribution, turns it
//! into `mkdir`/`head -c` shell commands and runs them inside the job's
//! running `app-unit` task, at most `--concurrency` at a time.
//!
//! ## Example
//!
//! ```bash
//! # Every app job owned by one account, large profile
//! backup-data-gen --account-id 4021 --size large
//!
//! # Jobs listed in a file, reproducible
//! backup-data-gen --job-ids-file jobs.txt --seed 7
//!
//! # Run an arbitrary command instead of generating data
//! backup-data-gen --job-id app-12 --cmd 'du -sh ./wp-content'
//! ```

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use datagen_core::Profile;
use datagen_exec::{
    read_target_list, CommandSource, DispatchConfig, Dispatcher, DockerOrchestrator,
    ExecutionGate, NomadClient, Orchestrator, RemoteExecutor, TargetDirectory, TargetFilter,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

mod config;
mod logging;

use config::{Backend, FileConfig, Overrides, RunConfig, TargetSelection};
use logging::LogFormat;

/// Generate synthetic backup data on remote application containers.
#[derive(Parser, Debug)]
#[command(name = "backup-data-gen")]
#[command(version, about, long_about = None)]
#[command(group(ArgGroup::new("targets").args(["job_id", "job_ids_file", "account_id"])))]
struct Cli {
    /// TOML configuration file; flags take precedence over its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run on a single job
    #[arg(long)]
    job_id: Option<String>,

    /// File with one job ID per line ('#' starts a comment)
    #[arg(long)]
    job_ids_file: Option<PathBuf>,

    /// Run on every app job owned by this account
    #[arg(long)]
    account_id: Option<String>,

    /// Run this shell command on each job instead of generating data
    #[arg(long)]
    cmd: Option<String>,

    /// Size profile: medium or large [default: medium]
    #[arg(long)]
    size: Option<String>,

    /// Root directory of the generated tree [default: ./wp-content/mwp-perf-data]
    #[arg(long)]
    root_dir: Option<String>,

    /// Maximum commands executing at once [default: 5]
    #[arg(long)]
    concurrency: Option<usize>,

    /// Maximum files per generated directory [default: 30]
    #[arg(long)]
    max_files: Option<usize>,

    /// Seed for reproducible data; job N uses seed + N
    #[arg(long)]
    seed: Option<u64>,

    /// Log filter, overridden by RUST_LOG [default: info]
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format [default: json]
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Orchestrator backend [default: nomad]
    #[arg(long, value_enum)]
    backend: Option<Backend>,

    /// Nomad agent address [default: http://127.0.0.1:4646]
    #[arg(long, env = "NOMAD_ADDR")]
    nomad_addr: Option<String>,

    /// Nomad ACL token
    #[arg(long, env = "NOMAD_TOKEN", hide_env_values = true)]
    nomad_token: Option<String>,

    /// Nomad namespace holding the app jobs [default: sites]
    #[arg(long, env = "NOMAD_NAMESPACE")]
    namespace: Option<String>,
}

impl Cli {
    fn into_overrides(self) -> Overrides {
        Overrides {
            job_id: self.job_id,
            job_ids_file: self.job_ids_file,
            account_id: self.account_id,
            cmd: self.cmd,
            size: self.size,
            root_dir: self.root_dir,
            concurrency: self.concurrency,
            max_files: self.max_files,
            seed: self.seed,
            log_level: self.log_level,
            log_format: self.log_format,
            backend: self.backend,
            nomad_addr: self.nomad_addr,
            nomad_token: self.nomad_token,
            namespace: self.namespace,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let config = RunConfig::resolve(file, cli.into_overrides()).context("Invalid configuration")?;

    logging::init(&config.logging)?;

    if let CommandSource::Generated(generator) = &config.source {
        if Profile::lookup(generator.profile()).is_none() {
            warn!(
                size = generator.profile(),
                valid = ?Profile::names().collect::<Vec<_>>(),
                "Unknown size profile, using the default"
            );
        }
    }

    let orchestrator = connect(&config)?;
    let targets = resolve_targets(&config, Arc::clone(&orchestrator)).await?;

    let executor = Arc::new(RemoteExecutor::new(orchestrator, config.executor.clone()));
    let gate = ExecutionGate::new(config.concurrency);
    stop_dispatch_on_ctrl_c(gate.clone());

    let dispatcher = Dispatcher::new(
        executor,
        gate,
        DispatchConfig {
            source: config.source.clone(),
            seed: config.seed,
        },
    );

    let started = Instant::now();
    let summary = dispatcher.run(&targets).await;
    info!(
        num_jobs = summary.targets,
        commands = summary.completed,
        failed = summary.failed,
        elapsed_secs = started.elapsed().as_secs_f64(),
        "Total time for data generation"
    );

    Ok(())
}

/// Build the configured orchestrator backend. Neither backend contacts its
/// server here.
fn connect(config: &RunConfig) -> Result<Arc<dyn Orchestrator>> {
    match config.backend {
        Backend::Nomad => {
            let client = NomadClient::new(config.nomad.clone())
                .context("Failed to create Nomad client")?;
            info!(
                address = %config.nomad.address,
                namespace = %config.nomad.namespace,
                "Using Nomad backend"
            );
            Ok(Arc::new(client))
        }
        Backend::Docker => {
            let docker = DockerOrchestrator::connect(config.executor.task_name.clone())
                .context("Failed to connect to the Docker daemon")?;
            info!("Using Docker backend");
            Ok(Arc::new(docker))
        }
    }
}

async fn resolve_targets(
    config: &RunConfig,
    orchestrator: Arc<dyn Orchestrator>,
) -> Result<Vec<String>> {
    let account = match &config.selection {
        TargetSelection::Job(job) => return Ok(vec![job.clone()]),
        TargetSelection::JobsFile(path) => return Ok(read_target_list(path).await?),
        TargetSelection::Account(account) => Some(account.as_str()),
        TargetSelection::All => None,
    };

    let filter = TargetFilter::new(&config.name_pattern, config.owner_meta_key.clone())
        .context("Invalid workload name pattern")?;
    let targets = TargetDirectory::new(orchestrator, filter)
        .resolve(account)
        .await?;
    Ok(targets)
}

/// The first Ctrl-C stops new dispatch and lets running commands finish; a
/// second one exits immediately.
fn stop_dispatch_on_ctrl_c(gate: ExecutionGate) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!(
            in_flight = gate.in_flight(),
            "Interrupted, waiting for running commands (Ctrl-C again to abort)"
        );
        gate.close();

        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}
