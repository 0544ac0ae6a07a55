//! Run orchestration.
//!
//! For every target the dispatcher produces a fresh command sequence, then
//! launches one task per command. Each launch first takes a slot from the
//! [`ExecutionGate`]; the task holds the slot until its execution is over.
//! Waiting for a slot is the only backpressure.
//!
//! ```text
//! for target:
//!     commands = generate(target)          fresh randomness per target
//!     for command:
//!         permit = gate.acquire()          blocks the loop when C are busy
//!         spawn { execute; drop(permit) }
//! join all
//! ```
//!
//! A failing command is logged and does not stop its siblings or the
//! remaining targets. Closing the gate stops new launches; executions that
//! already started are still awaited. There are no timeouts.

use crate::executor::RemoteExecutor;
use crate::gate::ExecutionGate;
use datagen_core::BackupDataGen;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// Where a target's commands come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSource {
    /// Synthetic data generated from a size profile.
    Generated(BackupDataGen),
    /// One fixed command, run once per target.
    Custom(String),
}

/// Immutable dispatch settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Command source for every target.
    pub source: CommandSource,
    /// Base seed; target `i` uses `seed + i`. `None` draws from entropy.
    pub seed: Option<u64>,
}

/// Counters for the end-of-run log line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Targets in the run.
    pub targets: usize,
    /// Commands launched.
    pub dispatched: usize,
    /// Commands that ran to completion (any exit code).
    pub completed: usize,
    /// Completed commands with a non-zero exit code.
    pub non_zero_exits: usize,
    /// Commands that could not be executed.
    pub failed: usize,
    /// True if dispatch stopped early because the gate was closed.
    pub interrupted: bool,
}

enum Outcome {
    Completed { exit_code: i64 },
    Failed,
}

impl RunSummary {
    fn record(&mut self, joined: Result<Outcome, JoinError>) {
        match joined {
            Ok(Outcome::Completed { exit_code }) => {
                self.completed += 1;
                if exit_code != 0 {
                    self.non_zero_exits += 1;
                }
            }
            Ok(Outcome::Failed) => self.failed += 1,
            Err(e) => {
                error!(error = %e, "Execution task aborted");
                self.failed += 1;
            }
        }
    }
}

/// Drives a whole run across all targets.
#[derive(Debug)]
pub struct Dispatcher {
    executor: Arc<RemoteExecutor>,
    gate: ExecutionGate,
    config: DispatchConfig,
}

impl Dispatcher {
    /// Create a dispatcher.
    pub fn new(executor: Arc<RemoteExecutor>, gate: ExecutionGate, config: DispatchConfig) -> Self {
        Self {
            executor,
            gate,
            config,
        }
    }

    /// The gate shared by all executions of this dispatcher.
    pub fn gate(&self) -> &ExecutionGate {
        &self.gate
    }

    /// Dispatch settings.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    fn rng_for(&self, index: usize) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index as u64)),
            None => StdRng::from_entropy(),
        }
    }

    /// The command sequence for the target at position `index`.
    pub fn commands_for(&self, index: usize, target: &str) -> Vec<String> {
        match &self.config.source {
            CommandSource::Custom(command) => vec![command.clone()],
            CommandSource::Generated(generator) => {
                let mut rng = self.rng_for(index);
                let plan = generator.plan(&mut rng);
                info!(
                    job_id = target,
                    profile = plan.distribution.profile,
                    total_bytes = plan.distribution.total_bytes,
                    commands = plan.commands.len(),
                    "Generated data plan"
                );
                for category in &plan.distribution.categories {
                    debug!(
                        job_id = target,
                        category = %category.name,
                        target_bytes = category.target_total_bytes,
                        generated_bytes = category.generated_bytes(),
                        "Category planned"
                    );
                }
                plan.commands
            }
        }
    }

    /// Run every target's commands and wait for all of them to finish.
    pub async fn run(&self, targets: &[String]) -> RunSummary {
        info!(num_jobs = targets.len(), "Running data generation on jobs");

        let mut summary = RunSummary {
            targets: targets.len(),
            ..Default::default()
        };
        let mut tasks = JoinSet::new();

        'targets: for (index, target) in targets.iter().enumerate() {
            info!(
                job_id = %target,
                current_job_count = index + 1,
                total_jobs = targets.len(),
                "Starting data generation on job"
            );

            for command in self.commands_for(index, target) {
                let Ok(permit) = self.gate.acquire().await else {
                    warn!(job_id = %target, "Dispatch interrupted; waiting for running executions");
                    summary.interrupted = true;
                    break 'targets;
                };

                let executor = Arc::clone(&self.executor);
                let target = target.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    run_single_exec(&executor, &target, &command).await
                });
                summary.dispatched += 1;

                while let Some(joined) = tasks.try_join_next() {
                    summary.record(joined);
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            summary.record(joined);
        }

        info!(
            targets = summary.targets,
            dispatched = summary.dispatched,
            completed = summary.completed,
            non_zero_exits = summary.non_zero_exits,
            failed = summary.failed,
            interrupted = summary.interrupted,
            "Dispatch finished"
        );
        summary
    }
}

/// Execute one command and log its outcome.
async fn run_single_exec(executor: &RemoteExecutor, target: &str, command: &str) -> Outcome {
    debug!(job_id = target, "Starting exec to job");

    let result = match executor.execute(target, command).await {
        Ok(result) => result,
        Err(e) => {
            warn!(job_id = target, error = %e, "Error executing command on job");
            return Outcome::Failed;
        }
    };

    debug!(job_id = target, exit_code = result.exit_code, "Command executed on job");
    if !result.stdout.is_empty() {
        info!(job_id = target, stdout = %result.stdout, "Stdout for job");
    }
    if !result.stderr.is_empty() {
        error!(job_id = target, stderr = %result.stderr, "Stderr for job");
    }

    Outcome::Completed {
        exit_code: result.exit_code,
    }
}
