//! Mock orchestrator for testing.
//!
//! Holds workloads and allocations in memory, records every exec call and
//! tracks how many exec sessions were open at the same time.

use super::{
    Allocation, ExecResult, Orchestrator, OrchestratorError, TaskState, WorkloadDetail,
    WorkloadStub, RUNNING,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One recorded call to [`Orchestrator::exec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCall {
    /// Allocation the command ran on.
    pub alloc_id: String,
    /// Task the command ran in.
    pub task: String,
    /// Full argv.
    pub command: Vec<String>,
    /// Bytes sent on stdin.
    pub stdin: Vec<u8>,
}

/// Mock orchestrator for testing.
///
/// Cloning shares the underlying state, so a test can keep a handle while the
/// code under test owns another.
#[derive(Debug, Default)]
pub struct MockOrchestrator {
    inner: Arc<Mutex<MockOrchestratorInner>>,
}

#[derive(Debug, Default)]
struct MockOrchestratorInner {
    workloads: Vec<WorkloadDetail>,
    allocations: HashMap<String, Vec<Allocation>>,
    failing_details: HashSet<String>,
    failing_execs: HashSet<String>,
    fail_list: Option<String>,
    exec_result: ExecResult,
    exec_delay: Duration,
    exec_calls: Vec<ExecCall>,
    detail_calls: usize,
    in_flight: usize,
    max_in_flight: usize,
}

impl MockOrchestrator {
    /// Create an empty mock orchestrator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workload with metadata.
    pub fn add_workload(&self, id: &str, name: &str, meta: &[(&str, &str)]) {
        let mut inner = self.inner.lock().unwrap();
        inner.workloads.push(WorkloadDetail {
            id: id.to_string(),
            name: name.to_string(),
            meta: meta
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
    }

    /// Register an allocation for a job.
    pub fn add_allocation(&self, allocation: Allocation) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .allocations
            .entry(allocation.job_id.clone())
            .or_default()
            .push(allocation);
    }

    /// Register an allocation whose `task` is in `state`.
    pub fn add_task_allocation(&self, job_id: &str, alloc_id: &str, task: &str, state: &str) {
        self.add_allocation(Allocation {
            id: alloc_id.to_string(),
            job_id: job_id.to_string(),
            task_states: HashMap::from([(task.to_string(), TaskState::new(state))]),
        });
    }

    /// Register a running allocation for `task`.
    pub fn add_running_allocation(&self, job_id: &str, alloc_id: &str, task: &str) {
        self.add_task_allocation(job_id, alloc_id, task, RUNNING);
    }

    /// Make `workload_detail` fail for this workload.
    pub fn fail_detail(&self, id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.failing_details.insert(id.to_string());
    }

    /// Make `exec` fail for this allocation.
    pub fn fail_exec(&self, alloc_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.failing_execs.insert(alloc_id.to_string());
    }

    /// Make `list_workloads` fail with the given message.
    pub fn fail_list(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_list = Some(error.to_string());
    }

    /// Result returned by every successful exec.
    pub fn set_exec_result(&self, result: ExecResult) {
        let mut inner = self.inner.lock().unwrap();
        inner.exec_result = result;
    }

    /// How long each exec takes.
    pub fn set_exec_delay(&self, delay: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.exec_delay = delay;
    }

    /// All exec calls in the order they started.
    pub fn exec_calls(&self) -> Vec<ExecCall> {
        let inner = self.inner.lock().unwrap();
        inner.exec_calls.clone()
    }

    /// Number of `workload_detail` calls made.
    pub fn detail_calls(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.detail_calls
    }

    /// Exec sessions currently open.
    pub fn in_flight(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.in_flight
    }

    /// Highest number of exec sessions that were open at once.
    pub fn max_in_flight(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.max_in_flight
    }
}

impl Clone for MockOrchestrator {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Orchestrator for MockOrchestrator {
    async fn list_workloads(&self) -> Result<Vec<WorkloadStub>, OrchestratorError> {
        let inner = self.inner.lock().unwrap();

        if let Some(error) = &inner.fail_list {
            return Err(OrchestratorError::Status {
                status: 500,
                body: error.clone(),
            });
        }

        Ok(inner
            .workloads
            .iter()
            .map(|w| WorkloadStub {
                id: w.id.clone(),
                name: w.name.clone(),
            })
            .collect())
    }

    async fn workload_detail(&self, id: &str) -> Result<WorkloadDetail, OrchestratorError> {
        let mut inner = self.inner.lock().unwrap();
        inner.detail_calls += 1;

        if inner.failing_details.contains(id) {
            return Err(OrchestratorError::Status {
                status: 500,
                body: format!("detail lookup failed for {id}"),
            });
        }

        inner
            .workloads
            .iter()
            .find(|w| w.id == id)
            .cloned()
            .ok_or_else(|| OrchestratorError::NotFound(id.to_string()))
    }

    async fn list_allocations(&self, job_id: &str) -> Result<Vec<Allocation>, OrchestratorError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.allocations.get(job_id).cloned().unwrap_or_default())
    }

    async fn allocation_detail(&self, alloc_id: &str) -> Result<Allocation, OrchestratorError> {
        let inner = self.inner.lock().unwrap();
        inner
            .allocations
            .values()
            .flatten()
            .find(|a| a.id == alloc_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::NotFound(alloc_id.to_string()))
    }

    async fn exec(
        &self,
        allocation: &Allocation,
        task: &str,
        command: &[String],
        stdin: &[u8],
    ) -> Result<ExecResult, OrchestratorError> {
        let delay = {
            let mut inner = self.inner.lock().unwrap();
            inner.exec_calls.push(ExecCall {
                alloc_id: allocation.id.clone(),
                task: task.to_string(),
                command: command.to_vec(),
                stdin: stdin.to_vec(),
            });
            inner.in_flight += 1;
            inner.max_in_flight = inner.max_in_flight.max(inner.in_flight);
            inner.exec_delay
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.lock().unwrap();
        inner.in_flight -= 1;

        if inner.failing_execs.contains(&allocation.id) {
            return Err(OrchestratorError::Exec(format!(
                "stream reset on {}",
                allocation.id
            )));
        }

        Ok(inner.exec_result.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_and_details_registered_workloads() {
        let mock = MockOrchestrator::new();
        mock.add_workload("app-1", "app-1", &[("account_id", "acct-1")]);

        let stubs = mock.list_workloads().await.unwrap();
        assert_eq!(stubs.len(), 1);
        assert_eq!(stubs[0].name, "app-1");

        let detail = mock.workload_detail("app-1").await.unwrap();
        assert_eq!(detail.meta.get("account_id").map(String::as_str), Some("acct-1"));
        assert_eq!(mock.detail_calls(), 1);

        assert!(matches!(
            mock.workload_detail("missing").await,
            Err(OrchestratorError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn exec_records_calls_and_returns_result() {
        let mock = MockOrchestrator::new();
        mock.add_running_allocation("app-1", "alloc-1", "app-unit");
        mock.set_exec_result(ExecResult {
            exit_code: 3,
            stdout: "out".into(),
            stderr: "err".into(),
        });

        let alloc = mock.allocation_detail("alloc-1").await.unwrap();
        let result = mock
            .exec(&alloc, "app-unit", &["true".to_string()], b"")
            .await
            .unwrap();

        assert_eq!(result.exit_code, 3);
        let calls = mock.exec_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].alloc_id, "alloc-1");
        assert_eq!(calls[0].command, vec!["true".to_string()]);
        assert_eq!(mock.in_flight(), 0);
        assert_eq!(mock.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn forced_failures() {
        let mock = MockOrchestrator::new();
        mock.add_running_allocation("app-1", "alloc-1", "app-unit");
        mock.fail_exec("alloc-1");
        mock.fail_list("boom");

        assert!(mock.list_workloads().await.is_err());

        let alloc = mock.allocation_detail("alloc-1").await.unwrap();
        let result = mock.exec(&alloc, "app-unit", &[], b"").await;
        assert!(matches!(result, Err(OrchestratorError::Exec(_))));
        assert_eq!(mock.in_flight(), 0);
    }
}
