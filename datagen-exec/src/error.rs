//! Error types for datagen-exec.

use crate::orchestrator::OrchestratorError;
use std::path::PathBuf;

/// Errors from executing one command on one target.
///
/// These are per-command failures: the dispatcher logs them and carries on.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The target has no allocation whose task is running.
    #[error("no running allocation found for job {target} (task {task})")]
    NoRunningEndpoint {
        /// Target identifier.
        target: String,
        /// Task that had to be running.
        task: String,
    },

    /// The resolved allocation disappeared before exec.
    #[error("allocation not found: {alloc_id}")]
    AllocationNotFound {
        /// Allocation identifier.
        alloc_id: String,
    },

    /// Orchestrator transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] OrchestratorError),
}

/// Errors resolving the set of targets.
///
/// These are configuration errors: the run aborts before any dispatch.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    /// The target list file could not be read.
    #[error("error reading target list {path}: {source}")]
    Io {
        /// Path of the list file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The target list file has no usable line.
    #[error("no valid job IDs found in file {path}")]
    EmptyList {
        /// Path of the list file.
        path: PathBuf,
    },

    /// Discovery matched no workload.
    #[error("no jobs found{}", account_suffix(.account))]
    NoTargets {
        /// Owner filter that was applied, if any.
        account: Option<String>,
    },

    /// The workload name pattern is not a valid regex.
    #[error("invalid workload name pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Listing workloads failed.
    #[error("transport error: {0}")]
    Transport(#[from] OrchestratorError),
}

fn account_suffix(account: &Option<String>) -> String {
    account
        .as_deref()
        .map(|a| format!(" for account ID: {a}"))
        .unwrap_or_default()
}
