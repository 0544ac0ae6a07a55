//! Docker backend via bollard.
//!
//! Lets the tool run against application containers on a local Docker daemon.
//! Mapping onto the orchestrator model:
//!
//! - a workload is a container (ID = container name, meta = labels)
//! - every container is its own single allocation
//! - the configured task name reports `running` while the container runs

use super::{
    Allocation, ExecResult, Orchestrator, OrchestratorError, TaskState, WorkloadDetail,
    WorkloadStub, RUNNING,
};
use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, ListContainersOptions, LogOutput};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::ContainerInspectResponse;
use bollard::Docker;
use futures_util::StreamExt;
use std::collections::HashMap;

/// Orchestrator backed by the local Docker daemon.
pub struct DockerOrchestrator {
    docker: Docker,
    task_name: String,
}

impl DockerOrchestrator {
    /// Connect to the local daemon (socket or `DOCKER_HOST`).
    ///
    /// `task_name` is the task every container reports its state under; use
    /// the same name the executor resolves.
    pub fn connect(task_name: impl Into<String>) -> Result<Self, OrchestratorError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self::with_client(docker, task_name))
    }

    /// Wrap an existing bollard client.
    pub fn with_client(docker: Docker, task_name: impl Into<String>) -> Self {
        Self {
            docker,
            task_name: task_name.into(),
        }
    }

    async fn inspect(&self, id: &str) -> Result<ContainerInspectResponse, OrchestratorError> {
        self.docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| not_found_or(e, id))
    }

    fn allocation_from(&self, job_id: &str, inspect: &ContainerInspectResponse) -> Allocation {
        let running = inspect
            .state
            .as_ref()
            .and_then(|s| s.running)
            .unwrap_or(false);
        let state = if running { RUNNING } else { "dead" };

        Allocation {
            id: inspect.id.clone().unwrap_or_else(|| job_id.to_string()),
            job_id: job_id.to_string(),
            task_states: HashMap::from([(self.task_name.clone(), TaskState::new(state))]),
        }
    }
}

impl std::fmt::Debug for DockerOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerOrchestrator")
            .field("task_name", &self.task_name)
            .finish_non_exhaustive()
    }
}

fn not_found_or(error: bollard::errors::Error, id: &str) -> OrchestratorError {
    match error {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => OrchestratorError::NotFound(id.to_string()),
        other => OrchestratorError::Docker(other),
    }
}

/// Container name without the leading slash Docker reports.
fn container_name(name: &str) -> String {
    name.trim_start_matches('/').to_string()
}

#[async_trait]
impl Orchestrator for DockerOrchestrator {
    async fn list_workloads(&self) -> Result<Vec<WorkloadStub>, OrchestratorError> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let name = c.names.as_ref()?.first().map(|n| container_name(n))?;
                Some(WorkloadStub {
                    id: name.clone(),
                    name,
                })
            })
            .collect())
    }

    async fn workload_detail(&self, id: &str) -> Result<WorkloadDetail, OrchestratorError> {
        let inspect = self.inspect(id).await?;
        let name = inspect
            .name
            .as_deref()
            .map(container_name)
            .unwrap_or_else(|| id.to_string());
        let meta = inspect
            .config
            .and_then(|c| c.labels)
            .unwrap_or_default();

        Ok(WorkloadDetail {
            id: id.to_string(),
            name,
            meta,
        })
    }

    async fn list_allocations(&self, job_id: &str) -> Result<Vec<Allocation>, OrchestratorError> {
        let inspect = self.inspect(job_id).await?;
        Ok(vec![self.allocation_from(job_id, &inspect)])
    }

    async fn allocation_detail(&self, alloc_id: &str) -> Result<Allocation, OrchestratorError> {
        let inspect = self.inspect(alloc_id).await?;
        let job_id = inspect
            .name
            .as_deref()
            .map(container_name)
            .unwrap_or_else(|| alloc_id.to_string());
        Ok(self.allocation_from(&job_id, &inspect))
    }

    async fn exec(
        &self,
        allocation: &Allocation,
        _task: &str,
        command: &[String],
        stdin: &[u8],
    ) -> Result<ExecResult, OrchestratorError> {
        if !stdin.is_empty() {
            return Err(OrchestratorError::Exec(
                "docker backend does not forward stdin".into(),
            ));
        }

        let exec_options = CreateExecOptions {
            cmd: Some(command.to_vec()),
            attach_stdin: Some(false),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(&allocation.id, exec_options)
            .await
            .map_err(|e| not_found_or(e, &allocation.id))?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        if let StartExecResults::Attached { mut output, .. } =
            self.docker.start_exec(&exec.id, None).await?
        {
            while let Some(msg) = output.next().await {
                match msg? {
                    LogOutput::StdOut { message } => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    LogOutput::StdErr { message } => {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    _ => {}
                }
            }
        }

        let inspect = self.docker.inspect_exec(&exec.id).await?;
        let exit_code = inspect.exit_code.unwrap_or(-1);

        Ok(ExecResult {
            exit_code,
            stdout,
            stderr,
        })
    }
}
