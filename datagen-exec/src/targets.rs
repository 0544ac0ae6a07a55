//! Target resolution.
//!
//! Targets come from one of three places:
//!
//! - a single identifier given on the command line (used as is)
//! - a list file with one identifier per line
//! - discovery: every application workload, optionally narrowed down to one
//!   owner account
//!
//! Discovery is one list call plus, when an owner filter is given, one detail
//! call per candidate. A failing detail call drops that candidate only.

use crate::error::TargetError;
use crate::orchestrator::Orchestrator;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Workload names that belong to applications: `app-` plus a number.
pub const DEFAULT_NAME_PATTERN: &str = r"^app-[0-9]+$";

/// Workload metadata key holding the owning account.
pub const DEFAULT_OWNER_META_KEY: &str = "account_id";

/// Line prefix marking a comment in target list files.
pub const COMMENT_PREFIX: char = '#';

/// Which workloads count as targets.
#[derive(Debug, Clone)]
pub struct TargetFilter {
    name_pattern: Regex,
    owner_meta_key: String,
}

impl TargetFilter {
    /// Build a filter from a name regex and an owner metadata key.
    pub fn new(name_pattern: &str, owner_meta_key: impl Into<String>) -> Result<Self, TargetError> {
        Ok(Self {
            name_pattern: Regex::new(name_pattern)?,
            owner_meta_key: owner_meta_key.into(),
        })
    }

    /// True if a workload with this name is an application.
    pub fn matches_name(&self, name: &str) -> bool {
        self.name_pattern.is_match(name)
    }

    /// Metadata key compared against the owner filter.
    pub fn owner_meta_key(&self) -> &str {
        &self.owner_meta_key
    }
}

impl Default for TargetFilter {
    fn default() -> Self {
        Self {
            name_pattern: Regex::new(DEFAULT_NAME_PATTERN).expect("default pattern is valid"),
            owner_meta_key: DEFAULT_OWNER_META_KEY.to_string(),
        }
    }
}

/// Resolves targets by querying the orchestrator.
pub struct TargetDirectory {
    orchestrator: Arc<dyn Orchestrator>,
    filter: TargetFilter,
}

impl std::fmt::Debug for TargetDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetDirectory")
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

impl TargetDirectory {
    /// Create a directory over an orchestrator.
    pub fn new(orchestrator: Arc<dyn Orchestrator>, filter: TargetFilter) -> Self {
        Self {
            orchestrator,
            filter,
        }
    }

    /// All application workloads, narrowed to `account` when given.
    ///
    /// May return an empty list; see [`resolve`](Self::resolve) for the
    /// variant that treats that as an error.
    pub async fn discover(&self, account: Option<&str>) -> Result<Vec<String>, TargetError> {
        let workloads = self.orchestrator.list_workloads().await?;
        let total = workloads.len();

        let candidates = dedup(
            workloads
                .into_iter()
                .filter(|w| self.filter.matches_name(&w.name))
                .map(|w| w.id),
        );
        debug!(total, candidates = candidates.len(), "Filtered workloads by name");

        match account {
            Some(account) if !account.is_empty() => {
                Ok(self.filter_by_owner(candidates, account).await)
            }
            _ => Ok(candidates),
        }
    }

    /// Like [`discover`](Self::discover), but no match is an error.
    pub async fn resolve(&self, account: Option<&str>) -> Result<Vec<String>, TargetError> {
        let targets = self.discover(account).await?;
        if targets.is_empty() {
            return Err(TargetError::NoTargets {
                account: account.map(str::to_string),
            });
        }
        info!(count = targets.len(), account, "Resolved targets");
        Ok(targets)
    }

    /// Keep the candidates whose owner metadata equals `account` exactly.
    ///
    /// One detail lookup per candidate; lookups that fail are logged and the
    /// candidate is dropped.
    pub async fn filter_by_owner(&self, candidates: Vec<String>, account: &str) -> Vec<String> {
        let key = self.filter.owner_meta_key();
        let mut matched = Vec::new();

        for id in candidates {
            match self.orchestrator.workload_detail(&id).await {
                Ok(detail) => {
                    if detail.meta.get(key).map(String::as_str) == Some(account) {
                        matched.push(id);
                    }
                }
                Err(e) => {
                    warn!(job_id = %id, error = %e, "Error getting job info; skipping");
                }
            }
        }

        matched
    }
}

/// Parse a target list: one identifier per line, blank lines and `#`
/// comments skipped, duplicates dropped.
pub fn parse_target_list(contents: &str) -> Vec<String> {
    dedup(
        contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with(COMMENT_PREFIX))
            .map(str::to_string),
    )
}

/// Read and parse a target list file. An empty result is an error.
pub async fn read_target_list(path: &Path) -> Result<Vec<String>, TargetError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| TargetError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let targets = parse_target_list(&contents);
    if targets.is_empty() {
        return Err(TargetError::EmptyList {
            path: path.to_path_buf(),
        });
    }

    info!(path = %path.display(), count = targets.len(), "Read job IDs from file");
    Ok(targets)
}

/// Drop repeated identifiers, keeping the first occurrence.
fn dedup(ids: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(id.clone())).collect()
}
