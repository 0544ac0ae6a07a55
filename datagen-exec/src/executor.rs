//! Remote command execution on an application's running task.
//!
//! [`RemoteExecutor::execute`] finds the target's live allocation, wraps the
//! command so it runs as the unprivileged site user, runs it with empty stdin
//! and returns whatever the process produced. A non-zero exit code is part of
//! the result, never an error.

use crate::error::ExecError;
use crate::orchestrator::{Allocation, ExecResult, Orchestrator, OrchestratorError};
use std::sync::Arc;
use tracing::debug;

/// Task inside an application allocation that accepts exec sessions.
pub const DEFAULT_TASK_NAME: &str = "app-unit";

/// Unprivileged account commands run as.
pub const DEFAULT_RUN_AS_USER: &str = "customer";

/// Login shell used to run the wrapped command.
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// Executor settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Task that must be running and receives the exec session.
    pub task_name: String,
    /// Account the command runs as.
    pub run_as_user: String,
    /// Shell interpreting the command string.
    pub shell: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            task_name: DEFAULT_TASK_NAME.into(),
            run_as_user: DEFAULT_RUN_AS_USER.into(),
            shell: DEFAULT_SHELL.into(),
        }
    }
}

/// Runs shell commands on a target's running task.
pub struct RemoteExecutor {
    orchestrator: Arc<dyn Orchestrator>,
    config: ExecutorConfig,
}

impl std::fmt::Debug for RemoteExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RemoteExecutor {
    /// Create an executor on top of an orchestrator.
    pub fn new(orchestrator: Arc<dyn Orchestrator>, config: ExecutorConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    /// Executor settings.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Find the allocation of `target` whose task is currently running.
    ///
    /// Returns the first match. If no task is running this fails immediately;
    /// there is no waiting for a pending allocation to be scheduled.
    pub async fn resolve_endpoint(&self, target: &str) -> Result<Allocation, ExecError> {
        let allocations = self.orchestrator.list_allocations(target).await?;

        allocations
            .into_iter()
            .find(|alloc| alloc.task_is_running(&self.config.task_name))
            .ok_or_else(|| ExecError::NoRunningEndpoint {
                target: target.to_string(),
                task: self.config.task_name.clone(),
            })
    }

    /// Argv that runs `command` through a login shell of the site user.
    pub fn wrap_command(&self, command: &str) -> Vec<String> {
        vec![
            "su".to_string(),
            "-l".to_string(),
            self.config.run_as_user.clone(),
            self.config.shell.clone(),
            "-c".to_string(),
            command.to_string(),
        ]
    }

    /// Run `command` on `target` and capture its output.
    pub async fn execute(&self, target: &str, command: &str) -> Result<ExecResult, ExecError> {
        let endpoint = self.resolve_endpoint(target).await?;

        let allocation = match self.orchestrator.allocation_detail(&endpoint.id).await {
            Ok(alloc) => alloc,
            Err(OrchestratorError::NotFound(_)) => {
                return Err(ExecError::AllocationNotFound {
                    alloc_id: endpoint.id,
                })
            }
            Err(e) => return Err(e.into()),
        };

        let argv = self.wrap_command(command);
        debug!(job_id = target, alloc_id = %allocation.id, ?argv, "Executing command");

        let result = self
            .orchestrator
            .exec(&allocation, &self.config.task_name, &argv, &[])
            .await?;
        Ok(result)
    }
}
