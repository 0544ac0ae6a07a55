//! Nomad HTTP API client.
//!
//! Read operations go through the REST API (`/v1/jobs`, `/v1/job/:id`,
//! `/v1/job/:id/allocations`, `/v1/allocation/:id`); exec goes through the
//! allocation exec websocket (`/v1/client/allocation/:id/exec`).
//!
//! All reads allow stale answers from any server, matching how the tool is
//! used: a slightly old job list is fine, a round trip to the leader per
//! request is not.
//!
//! ## Exec protocol
//!
//! ```text
//! client → {"stdin":{"data":"<base64>"}}      (optional)
//! client → {"stdin":{"close":true}}
//! server ← {"stdout":{"data":"<base64>"}}     (any number)
//! server ← {"stderr":{"data":"<base64>"}}     (any number)
//! server ← {"exited":true,"result":{"exit_code":N}}
//! ```

use super::{
    Allocation, ExecResult, Orchestrator, OrchestratorError, TaskState, WorkloadDetail,
    WorkloadStub,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::{Sink, SinkExt, StreamExt};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use url::Url;

/// Header carrying the ACL token.
const TOKEN_HEADER: &str = "x-nomad-token";

/// Nomad client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NomadConfig {
    /// Base address of a Nomad agent, e.g. `http://127.0.0.1:4646`.
    pub address: String,
    /// ACL token, if the cluster has ACLs enabled.
    pub token: Option<String>,
    /// Namespace holding the application jobs.
    pub namespace: String,
    /// Allow any server to answer reads.
    pub allow_stale: bool,
}

impl Default for NomadConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:4646".into(),
            token: None,
            namespace: "sites".into(),
            allow_stale: true,
        }
    }
}

impl NomadConfig {
    /// Defaults overridden by `NOMAD_ADDR`, `NOMAD_TOKEN` and `NOMAD_NAMESPACE`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(address) = std::env::var("NOMAD_ADDR") {
            config.address = address;
        }
        if let Ok(token) = std::env::var("NOMAD_TOKEN") {
            config.token = Some(token).filter(|t| !t.is_empty());
        }
        if let Ok(namespace) = std::env::var("NOMAD_NAMESPACE") {
            config.namespace = namespace;
        }
        config
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct JobListStub {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct Job {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Meta", default)]
    meta: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct WireTaskState {
    #[serde(rename = "State")]
    state: String,
}

#[derive(Debug, Deserialize)]
struct WireAllocation {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "JobID", default)]
    job_id: String,
    #[serde(rename = "TaskStates", default)]
    task_states: Option<HashMap<String, WireTaskState>>,
}

impl From<WireAllocation> for Allocation {
    fn from(wire: WireAllocation) -> Self {
        Self {
            id: wire.id,
            job_id: wire.job_id,
            task_states: wire
                .task_states
                .unwrap_or_default()
                .into_iter()
                .map(|(task, state)| (task, TaskState::new(state.state)))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct StdinFrame<'a> {
    stdin: StdinPayload<'a>,
}

#[derive(Debug, Serialize)]
struct StdinPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    close: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct OutputPayload {
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ExitPayload {
    #[serde(default)]
    exit_code: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct ExecFrame {
    #[serde(default)]
    stdout: Option<OutputPayload>,
    #[serde(default)]
    stderr: Option<OutputPayload>,
    #[serde(default)]
    exited: bool,
    #[serde(default)]
    result: Option<ExitPayload>,
}

/// Accumulates exec output frames until the process exits.
#[derive(Debug, Default)]
struct ExecCollector {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: Option<i64>,
}

impl ExecCollector {
    /// Feed one text frame. Returns true once the process has exited.
    fn push_frame(&mut self, text: &str) -> Result<bool, OrchestratorError> {
        let frame: ExecFrame = serde_json::from_str(text)
            .map_err(|e| OrchestratorError::Decode(format!("exec frame: {e}")))?;

        if let Some(data) = frame.stdout.and_then(|p| p.data) {
            self.stdout.extend(decode_payload(&data)?);
        }
        if let Some(data) = frame.stderr.and_then(|p| p.data) {
            self.stderr.extend(decode_payload(&data)?);
        }
        if frame.exited {
            self.exit_code = Some(frame.result.and_then(|r| r.exit_code).unwrap_or(0));
        }

        Ok(self.exit_code.is_some())
    }

    fn finish(self) -> Result<ExecResult, OrchestratorError> {
        let exit_code = self.exit_code.ok_or_else(|| {
            OrchestratorError::Exec("connection closed before the process exited".into())
        })?;

        Ok(ExecResult {
            exit_code,
            stdout: String::from_utf8_lossy(&self.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&self.stderr).into_owned(),
        })
    }
}

fn decode_payload(data: &str) -> Result<Vec<u8>, OrchestratorError> {
    BASE64
        .decode(data)
        .map_err(|e| OrchestratorError::Decode(format!("exec payload: {e}")))
}

fn ws_error(e: tokio_tungstenite::tungstenite::Error) -> OrchestratorError {
    OrchestratorError::WebSocket(e.to_string())
}

// ============================================================================
// Client
// ============================================================================

/// Client for the Nomad HTTP API.
#[derive(Debug, Clone)]
pub struct NomadClient {
    config: NomadConfig,
    base: Url,
    http: reqwest::Client,
}

impl NomadClient {
    /// Create a client. No request is made until the first call.
    pub fn new(config: NomadConfig) -> Result<Self, OrchestratorError> {
        let base = Url::parse(&config.address)
            .map_err(|e| OrchestratorError::InvalidAddress(format!("{}: {e}", config.address)))?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(OrchestratorError::InvalidAddress(config.address.clone()));
        }

        Ok(Self {
            config,
            base,
            http: reqwest::Client::new(),
        })
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &NomadConfig {
        &self.config
    }

    /// Build `<base>/<segments...>`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, OrchestratorError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| OrchestratorError::InvalidAddress(self.config.address.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![("namespace", self.config.namespace.clone())];
        if self.config.allow_stale {
            query.push(("stale", "true".to_string()));
        }
        query
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
    ) -> Result<T, OrchestratorError> {
        let url = self.endpoint(segments)?;
        let mut request = self.http.get(url.clone()).query(&self.query());
        if let Some(token) = &self.config.token {
            request = request.header(TOKEN_HEADER, token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(OrchestratorError::NotFound(url.path().to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| OrchestratorError::Decode(format!("{}: {e}", url.path())))
    }

    /// Websocket URL for an exec session.
    fn exec_url(
        &self,
        alloc_id: &str,
        task: &str,
        command: &[String],
    ) -> Result<Url, OrchestratorError> {
        let mut url = self.endpoint(&["v1", "client", "allocation", alloc_id, "exec"])?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| OrchestratorError::InvalidAddress(self.config.address.clone()))?;

        let command = serde_json::to_string(command)
            .map_err(|e| OrchestratorError::Decode(format!("exec command: {e}")))?;
        url.query_pairs_mut()
            .append_pair("task", task)
            .append_pair("tty", "false")
            .append_pair("command", &command)
            .append_pair("namespace", &self.config.namespace);
        Ok(url)
    }
}

#[async_trait]
impl Orchestrator for NomadClient {
    async fn list_workloads(&self) -> Result<Vec<WorkloadStub>, OrchestratorError> {
        let jobs: Vec<JobListStub> = self.get_json(&["v1", "jobs"]).await?;
        Ok(jobs
            .into_iter()
            .map(|job| WorkloadStub {
                id: job.id,
                name: job.name,
            })
            .collect())
    }

    async fn workload_detail(&self, id: &str) -> Result<WorkloadDetail, OrchestratorError> {
        let job: Job = self.get_json(&["v1", "job", id]).await?;
        Ok(WorkloadDetail {
            id: job.id,
            name: job.name,
            meta: job.meta.unwrap_or_default(),
        })
    }

    async fn list_allocations(&self, job_id: &str) -> Result<Vec<Allocation>, OrchestratorError> {
        let allocs: Vec<WireAllocation> =
            self.get_json(&["v1", "job", job_id, "allocations"]).await?;
        Ok(allocs.into_iter().map(Allocation::from).collect())
    }

    async fn allocation_detail(&self, alloc_id: &str) -> Result<Allocation, OrchestratorError> {
        let alloc: WireAllocation = self.get_json(&["v1", "allocation", alloc_id]).await?;
        Ok(alloc.into())
    }

    async fn exec(
        &self,
        allocation: &Allocation,
        task: &str,
        command: &[String],
        stdin: &[u8],
    ) -> Result<ExecResult, OrchestratorError> {
        let url = self.exec_url(&allocation.id, task, command)?;
        let mut request = url.as_str().into_client_request().map_err(ws_error)?;
        if let Some(token) = &self.config.token {
            let value = HeaderValue::from_str(token)
                .map_err(|e| OrchestratorError::InvalidAddress(format!("token header: {e}")))?;
            request.headers_mut().insert(TOKEN_HEADER, value);
        }

        debug!(alloc_id = %allocation.id, task, "Opening exec session");
        let (mut socket, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(ws_error)?;

        if !stdin.is_empty() {
            let data = BASE64.encode(stdin);
            send_stdin(&mut socket, Some(&data), None).await?;
        }
        send_stdin(&mut socket, None, Some(true)).await?;

        let mut collector = ExecCollector::default();
        while let Some(message) = socket.next().await {
            match message.map_err(ws_error)? {
                Message::Text(text) => {
                    if collector.push_frame(&text)? {
                        break;
                    }
                }
                Message::Close(Some(frame)) if frame.code != CloseCode::Normal => {
                    return Err(OrchestratorError::Exec(format!(
                        "session closed: {} {}",
                        u16::from(frame.code),
                        frame.reason
                    )));
                }
                Message::Close(_) => break,
                _ => {}
            }
        }

        // Best effort; the remote side may already have closed.
        let _ = socket.close(None).await;

        collector.finish()
    }
}

async fn send_stdin<S>(
    socket: &mut S,
    data: Option<&str>,
    close: Option<bool>,
) -> Result<(), OrchestratorError>
where
    S: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let frame = StdinFrame {
        stdin: StdinPayload { data, close },
    };
    let text = serde_json::to_string(&frame)
        .map_err(|e| OrchestratorError::Decode(format!("stdin frame: {e}")))?;
    socket.send(Message::Text(text.into())).await.map_err(ws_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client_for(server: &MockServer, token: Option<&str>) -> NomadClient {
        NomadClient::new(NomadConfig {
            address: server.base_url(),
            token: token.map(str::to_string),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn rejects_unusable_addresses() {
        for address in ["not a url", "mailto:ops@example.com", "ftp://nomad:4646"] {
            let result = NomadClient::new(NomadConfig {
                address: address.into(),
                ..Default::default()
            });
            assert!(
                matches!(result, Err(OrchestratorError::InvalidAddress(_))),
                "{address} should be rejected"
            );
        }
    }

    #[test]
    fn exec_url_switches_scheme_and_encodes_command() {
        let client = NomadClient::new(NomadConfig {
            address: "https://nomad.internal:4646/".into(),
            ..Default::default()
        })
        .unwrap();

        let command = vec!["su".to_string(), "-c".to_string(), "echo hi".to_string()];
        let url = client.exec_url("alloc-1", "app-unit", &command).unwrap();

        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.path(), "/v1/client/allocation/alloc-1/exec");
        let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["task"], "app-unit");
        assert_eq!(pairs["tty"], "false");
        assert_eq!(pairs["namespace"], "sites");
        let decoded: Vec<String> = serde_json::from_str(&pairs["command"]).unwrap();
        assert_eq!(decoded, command);
    }

    #[test]
    fn collector_decodes_output_and_exit() {
        let mut collector = ExecCollector::default();
        let out = BASE64.encode("hello ");
        let out2 = BASE64.encode("world");
        let err = BASE64.encode("warning");

        assert!(!collector
            .push_frame(&json!({"stdout": {"data": out}}).to_string())
            .unwrap());
        assert!(!collector
            .push_frame(&json!({"stderr": {"data": err}}).to_string())
            .unwrap());
        assert!(!collector
            .push_frame(&json!({"stdout": {"data": out2}}).to_string())
            .unwrap());
        assert!(collector
            .push_frame(&json!({"exited": true, "result": {"exit_code": 7}}).to_string())
            .unwrap());

        let result = collector.finish().unwrap();
        assert_eq!(result.stdout, "hello world");
        assert_eq!(result.stderr, "warning");
        assert_eq!(result.exit_code, 7);
    }

    #[test]
    fn collector_defaults_missing_exit_code_to_zero() {
        let mut collector = ExecCollector::default();
        assert!(collector
            .push_frame(&json!({"exited": true, "result": {}}).to_string())
            .unwrap());
        assert_eq!(collector.finish().unwrap().exit_code, 0);
    }

    #[test]
    fn collector_requires_exit_frame() {
        let mut collector = ExecCollector::default();
        collector
            .push_frame(&json!({"stdout": {"close": true}}).to_string())
            .unwrap();
        assert!(matches!(
            collector.finish(),
            Err(OrchestratorError::Exec(_))
        ));
    }

    #[test]
    fn collector_rejects_bad_payloads() {
        let mut collector = ExecCollector::default();
        assert!(collector.push_frame("not json").is_err());
        assert!(collector
            .push_frame(&json!({"stdout": {"data": "%%%"}}).to_string())
            .is_err());
    }

    #[test]
    fn stdin_close_frame_shape() {
        let frame = StdinFrame {
            stdin: StdinPayload {
                data: None,
                close: Some(true),
            },
        };
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"stdin": {"close": true}})
        );
    }

    #[tokio::test]
    async fn list_workloads_reads_job_stubs() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/v1/jobs")
                .query_param("namespace", "sites")
                .query_param("stale", "true")
                .header(TOKEN_HEADER, "secret");
            then.status(200).json_body(json!([
                {"ID": "app-1", "Name": "app-1", "Type": "service"},
                {"ID": "worker-9", "Name": "worker-9", "Type": "batch"}
            ]));
        });

        let client = client_for(&server, Some("secret"));
        let workloads = client.list_workloads().await.unwrap();

        mock.assert();
        assert_eq!(
            workloads,
            vec![
                WorkloadStub {
                    id: "app-1".into(),
                    name: "app-1".into()
                },
                WorkloadStub {
                    id: "worker-9".into(),
                    name: "worker-9".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn workload_detail_tolerates_null_meta() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/v1/job/app-1");
            then.status(200)
                .json_body(json!({"ID": "app-1", "Name": "app-1", "Meta": null}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/v1/job/app-2");
            then.status(200).json_body(
                json!({"ID": "app-2", "Name": "app-2", "Meta": {"account_id": "acct-9"}}),
            );
        });

        let client = client_for(&server, None);
        assert!(client.workload_detail("app-1").await.unwrap().meta.is_empty());
        assert_eq!(
            client.workload_detail("app-2").await.unwrap().meta["account_id"],
            "acct-9"
        );
    }

    #[tokio::test]
    async fn list_allocations_maps_task_states() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/v1/job/app-1/allocations");
            then.status(200).json_body(json!([
                {"ID": "a-dead", "JobID": "app-1", "TaskStates": {"app-unit": {"State": "dead"}}},
                {"ID": "a-new", "JobID": "app-1", "TaskStates": null},
                {"ID": "a-run", "JobID": "app-1", "TaskStates": {"app-unit": {"State": "running"}}}
            ]));
        });

        let client = client_for(&server, None);
        let allocs = client.list_allocations("app-1").await.unwrap();

        assert_eq!(allocs.len(), 3);
        assert!(!allocs[0].task_is_running("app-unit"));
        assert!(allocs[1].task_states.is_empty());
        assert!(allocs[2].task_is_running("app-unit"));
    }

    #[tokio::test]
    async fn status_codes_map_to_errors() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/v1/allocation/missing");
            then.status(404).body("alloc not found");
        });
        server.mock(|when, then| {
            when.method(GET).path("/v1/allocation/forbidden");
            then.status(403).body("Permission denied");
        });

        let client = client_for(&server, None);
        assert!(matches!(
            client.allocation_detail("missing").await,
            Err(OrchestratorError::NotFound(_))
        ));
        match client.allocation_detail("forbidden").await {
            Err(OrchestratorError::Status { status, body }) => {
                assert_eq!(status, 403);
                assert_eq!(body, "Permission denied");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }
}
