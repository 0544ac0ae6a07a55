//! Orchestrator abstraction.
//!
//! The executor, the target directory and the dispatcher only need five
//! operations from the cluster orchestrator: list workloads, fetch a
//! workload's metadata, list its allocations, fetch one allocation and run a
//! command inside one of its tasks. [`Orchestrator`] captures exactly that
//! shape so the core never depends on a particular transport.
//!
//! # Backends
//!
//! - [`NomadClient`]: HashiCorp Nomad HTTP API, exec over websocket
//! - [`DockerOrchestrator`]: local Docker daemon via bollard
//! - [`MockOrchestrator`]: in-memory, for tests

mod docker;
mod mock;
mod nomad;

pub use docker::DockerOrchestrator;
pub use mock::{ExecCall, MockOrchestrator};
pub use nomad::{NomadClient, NomadConfig};

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// Task state reported for a task that is up and accepting exec sessions.
pub const RUNNING: &str = "running";

/// Errors from talking to the orchestrator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The configured orchestrator address is not usable.
    #[error("invalid orchestrator address: {0}")]
    InvalidAddress(String),

    /// HTTP transport failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The orchestrator answered with a non-success status.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The requested object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Exec websocket failure.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Docker API error.
    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    /// The exec session ended abnormally.
    #[error("exec failed: {0}")]
    Exec(String),
}

/// Summary entry from a workload listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadStub {
    /// Workload identifier (Nomad job ID, container name).
    pub id: String,
    /// Workload name; matched against the target name pattern.
    pub name: String,
}

/// Full workload record, including owner metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadDetail {
    /// Workload identifier.
    pub id: String,
    /// Workload name.
    pub name: String,
    /// Free-form metadata (Nomad job meta, Docker labels).
    pub meta: HashMap<String, String>,
}

/// State of one task inside an allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskState {
    /// Orchestrator state string, e.g. `running`, `pending`, `dead`.
    pub state: String,
}

impl TaskState {
    /// Create a task state.
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
        }
    }

    /// True if the task can accept exec sessions.
    pub fn is_running(&self) -> bool {
        self.state == RUNNING
    }
}

/// One placement of a workload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Allocation {
    /// Allocation identifier.
    pub id: String,
    /// Workload the allocation belongs to.
    pub job_id: String,
    /// Task states keyed by task name.
    pub task_states: HashMap<String, TaskState>,
}

impl Allocation {
    /// True if `task` exists in this allocation and is running.
    pub fn task_is_running(&self, task: &str) -> bool {
        self.task_states
            .get(task)
            .is_some_and(TaskState::is_running)
    }
}

/// Result of a command executed on a remote task.
///
/// A non-zero exit code is a normal result, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Exit code of the remote process.
    pub exit_code: i64,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl ExecResult {
    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// The orchestrator operations the rest of the crate relies on.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// List all workloads visible to this client.
    async fn list_workloads(&self) -> Result<Vec<WorkloadStub>, OrchestratorError>;

    /// Fetch one workload including its metadata.
    async fn workload_detail(&self, id: &str) -> Result<WorkloadDetail, OrchestratorError>;

    /// List the allocations of a workload.
    async fn list_allocations(&self, job_id: &str) -> Result<Vec<Allocation>, OrchestratorError>;

    /// Fetch one allocation.
    async fn allocation_detail(&self, alloc_id: &str) -> Result<Allocation, OrchestratorError>;

    /// Run `command` (argv form) inside `task` of `allocation`.
    ///
    /// `stdin` is streamed to the process and then closed; output is captured
    /// fully in memory. Blocks until the remote process exits.
    async fn exec(
        &self,
        allocation: &Allocation,
        task: &str,
        command: &[String],
        stdin: &[u8],
    ) -> Result<ExecResult, OrchestratorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_is_running_requires_named_task() {
        let mut alloc = Allocation {
            id: "a1".into(),
            job_id: "app-1".into(),
            ..Default::default()
        };
        assert!(!alloc.task_is_running("app-unit"));

        alloc
            .task_states
            .insert("sidecar".into(), TaskState::new(RUNNING));
        assert!(!alloc.task_is_running("app-unit"));

        alloc
            .task_states
            .insert("app-unit".into(), TaskState::new("pending"));
        assert!(!alloc.task_is_running("app-unit"));

        alloc
            .task_states
            .insert("app-unit".into(), TaskState::new(RUNNING));
        assert!(alloc.task_is_running("app-unit"));
    }

    #[test]
    fn exec_result_success() {
        assert!(ExecResult::default().success());
        let failed = ExecResult {
            exit_code: 2,
            ..Default::default()
        };
        assert!(!failed.success());
    }
}
