//! # datagen-exec
//!
//! Remote execution side of backup data generation.
//!
//! - [`orchestrator`]: the [`Orchestrator`] seam with Nomad, Docker and mock backends
//! - [`targets`]: which workloads a run touches
//! - [`executor`]: runs one command inside one workload's running task
//! - [`gate`]: the counting gate bounding concurrent executions
//! - [`dispatcher`]: generates commands per target and fans them out
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use datagen_core::{BackupDataGen, CommandBuilder};
//! use backup_datagen_exec::{
//!     CommandSource, DispatchConfig, Dispatcher, ExecutionGate, ExecutorConfig,
//!     NomadClient, NomadConfig, RemoteExecutor,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let nomad = Arc::new(NomadClient::new(NomadConfig::from_env())?);
//! let executor = Arc::new(RemoteExecutor::new(nomad, ExecutorConfig::default()));
//! let generator = BackupDataGen::new(CommandBuilder::new("./wp-content/mwp-perf-data", 30), "medium");
//!
//! let dispatcher = Dispatcher::new(
//!     executor,
//!     ExecutionGate::new(5),
//!     DispatchConfig { source: CommandSource::Generated(generator), seed: None },
//! );
//! let summary = dispatcher.run(&["app-1".to_string()]).await;
//! println!("{} commands completed", summary.completed);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod gate;
pub mod orchestrator;
pub mod targets;

pub use dispatcher::{CommandSource, DispatchConfig, Dispatcher, RunSummary};
pub use error::{ExecError, TargetError};
pub use executor::{
    ExecutorConfig, RemoteExecutor, DEFAULT_RUN_AS_USER, DEFAULT_SHELL, DEFAULT_TASK_NAME,
};
pub use gate::{ExecutionGate, GateClosed, GatePermit, DEFAULT_CONCURRENCY};
pub use orchestrator::{
    Allocation, DockerOrchestrator, ExecResult, MockOrchestrator, NomadClient, NomadConfig,
    Orchestrator, OrchestratorError, TaskState, WorkloadDetail, WorkloadStub,
};
pub use targets::{
    parse_target_list, read_target_list, TargetDirectory, TargetFilter, DEFAULT_NAME_PATTERN,
    DEFAULT_OWNER_META_KEY,
};
