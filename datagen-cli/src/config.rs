//! Run configuration.
//!
//! Values come from three layers, highest precedence first: command-line
//! flags (and their environment variables), the optional TOML file, built-in
//! defaults. The merged result is validated once into an immutable
//! [`RunConfig`] before anything is dispatched.
//!
//! ```toml
//! [generation]
//! size = "large"
//! root_dir = "./wp-content/mwp-perf-data"
//! max_files = 30
//!
//! [dispatch]
//! concurrency = 10
//!
//! [logging]
//! level = "debug"
//! format = "pretty"
//!
//! [orchestrator]
//! backend = "nomad"
//!
//! [nomad]
//! address = "https://nomad.example.com:4646"
//! namespace = "sites"
//! ```

use crate::logging::{LogFormat, LoggingSettings};
use clap::ValueEnum;
use datagen_core::{BackupDataGen, CommandBuilder, DEFAULT_PROFILE};
use datagen_exec::{
    CommandSource, ExecutorConfig, NomadConfig, DEFAULT_CONCURRENCY, DEFAULT_NAME_PATTERN,
    DEFAULT_OWNER_META_KEY,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Directory the generated tree is rooted at, relative to the login shell's
/// working directory.
pub const DEFAULT_ROOT_DIR: &str = "./wp-content/mwp-perf-data";

/// Most files written into one generated directory.
pub const DEFAULT_MAX_FILES: usize = 30;

/// Which orchestrator the run talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// HashiCorp Nomad HTTP API.
    #[default]
    Nomad,
    /// Local Docker daemon.
    Docker,
}

/// How the run's targets are chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelection {
    /// A single job.
    Job(String),
    /// Job identifiers listed in a file.
    JobsFile(PathBuf),
    /// Every app workload owned by an account.
    Account(String),
    /// Every app workload.
    All,
}

/// Configuration errors. All of them abort the run before dispatch.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the configuration file.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },

    /// A value is out of range.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending setting.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Contents of the TOML configuration file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Data generation settings.
    pub generation: GenerationSection,
    /// Dispatch settings.
    pub dispatch: DispatchSection,
    /// Logging settings.
    pub logging: LoggingSection,
    /// Backend selection.
    pub orchestrator: OrchestratorSection,
    /// Nomad connection.
    pub nomad: NomadSection,
    /// Remote execution settings.
    pub executor: ExecutorSection,
    /// Target discovery settings.
    pub targets: TargetsSection,
}

/// `[generation]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationSection {
    /// Size profile name.
    pub size: Option<String>,
    /// Root directory of the generated tree.
    pub root_dir: Option<String>,
    /// Most files per generated directory.
    pub max_files: Option<usize>,
    /// Base seed for reproducible runs.
    pub seed: Option<u64>,
    /// Fixed command replacing data generation.
    pub cmd: Option<String>,
}

/// `[dispatch]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchSection {
    /// Most executions in flight at once.
    pub concurrency: Option<usize>,
}

/// `[logging]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// Filter directive.
    pub level: Option<String>,
    /// Output format.
    pub format: Option<LogFormat>,
}

/// `[orchestrator]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorSection {
    /// Backend to use.
    pub backend: Option<Backend>,
}

/// `[nomad]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NomadSection {
    /// Agent address.
    pub address: Option<String>,
    /// ACL token.
    pub token: Option<String>,
    /// Namespace holding the application jobs.
    pub namespace: Option<String>,
    /// Allow stale reads.
    pub allow_stale: Option<bool>,
}

/// `[executor]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorSection {
    /// Task that must be running to accept commands.
    pub task: Option<String>,
    /// User the commands run as.
    pub user: Option<String>,
    /// Shell interpreting the commands.
    pub shell: Option<String>,
}

/// `[targets]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetsSection {
    /// Regex a workload name must match.
    pub name_pattern: Option<String>,
    /// Metadata key holding the owning account.
    pub owner_meta_key: Option<String>,
}

impl FileConfig {
    /// Load the configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Parse configuration text.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Values given on the command line. `None` means "not given".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    /// Single job to run on.
    pub job_id: Option<String>,
    /// File listing job identifiers.
    pub job_ids_file: Option<PathBuf>,
    /// Owner account narrowing discovery.
    pub account_id: Option<String>,
    /// Fixed command replacing data generation.
    pub cmd: Option<String>,
    /// Size profile name.
    pub size: Option<String>,
    /// Root directory of the generated tree.
    pub root_dir: Option<String>,
    /// Most executions in flight at once.
    pub concurrency: Option<usize>,
    /// Most files per generated directory.
    pub max_files: Option<usize>,
    /// Base seed for reproducible runs.
    pub seed: Option<u64>,
    /// Log filter directive.
    pub log_level: Option<String>,
    /// Log output format.
    pub log_format: Option<LogFormat>,
    /// Orchestrator backend.
    pub backend: Option<Backend>,
    /// Nomad agent address.
    pub nomad_addr: Option<String>,
    /// Nomad ACL token.
    pub nomad_token: Option<String>,
    /// Nomad namespace.
    pub namespace: Option<String>,
}

/// Fully resolved, validated settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Which targets to run on.
    pub selection: TargetSelection,
    /// What to run on each target.
    pub source: CommandSource,
    /// Execution gate capacity.
    pub concurrency: usize,
    /// Base seed, if the run should be reproducible.
    pub seed: Option<u64>,
    /// Logging settings.
    pub logging: LoggingSettings,
    /// Orchestrator backend.
    pub backend: Backend,
    /// Nomad connection, used with [`Backend::Nomad`].
    pub nomad: NomadConfig,
    /// Remote execution settings.
    pub executor: ExecutorConfig,
    /// Workload name regex.
    pub name_pattern: String,
    /// Owner metadata key.
    pub owner_meta_key: String,
}

impl RunConfig {
    /// Merge command-line values over the file over the defaults, then
    /// validate.
    pub fn resolve(file: FileConfig, cli: Overrides) -> Result<Self, ConfigError> {
        let concurrency = cli
            .concurrency
            .or(file.dispatch.concurrency)
            .unwrap_or(DEFAULT_CONCURRENCY);
        if concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "concurrency",
                reason: "must be at least 1".into(),
            });
        }

        let max_files = cli
            .max_files
            .or(file.generation.max_files)
            .unwrap_or(DEFAULT_MAX_FILES);
        if max_files == 0 {
            return Err(ConfigError::Invalid {
                field: "max files",
                reason: "must be at least 1".into(),
            });
        }

        let root_dir = cli
            .root_dir
            .or(file.generation.root_dir)
            .unwrap_or_else(|| DEFAULT_ROOT_DIR.to_string());
        if root_dir.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "root dir",
                reason: "must not be empty".into(),
            });
        }
        if let Some(c) = root_dir.chars().find(|&c| !is_shell_safe_path_char(c)) {
            return Err(ConfigError::Invalid {
                field: "root dir",
                reason: format!(
                    "unsupported character {c:?}; paths are passed to the shell unquoted"
                ),
            });
        }

        let source = match non_empty(cli.cmd).or(non_empty(file.generation.cmd)) {
            Some(command) => CommandSource::Custom(command),
            None => {
                let size = cli
                    .size
                    .or(file.generation.size)
                    .unwrap_or_else(|| DEFAULT_PROFILE.to_string());
                CommandSource::Generated(BackupDataGen::new(
                    CommandBuilder::new(&root_dir, max_files),
                    size,
                ))
            }
        };

        let selection = if let Some(job) = non_empty(cli.job_id) {
            TargetSelection::Job(job)
        } else if let Some(path) = cli.job_ids_file {
            TargetSelection::JobsFile(path)
        } else if let Some(account) = non_empty(cli.account_id) {
            TargetSelection::Account(account)
        } else {
            TargetSelection::All
        };

        let logging = LoggingSettings {
            level: cli
                .log_level
                .or(file.logging.level)
                .unwrap_or_else(|| crate::logging::DEFAULT_LOG_LEVEL.to_string()),
            format: cli.log_format.or(file.logging.format).unwrap_or_default(),
        };

        let defaults = NomadConfig::default();
        let nomad = NomadConfig {
            address: cli
                .nomad_addr
                .or(file.nomad.address)
                .unwrap_or(defaults.address),
            token: non_empty(cli.nomad_token.or(file.nomad.token)),
            namespace: cli
                .namespace
                .or(file.nomad.namespace)
                .unwrap_or(defaults.namespace),
            allow_stale: file.nomad.allow_stale.unwrap_or(defaults.allow_stale),
        };

        let defaults = ExecutorConfig::default();
        let executor = ExecutorConfig {
            task_name: file.executor.task.unwrap_or(defaults.task_name),
            run_as_user: file.executor.user.unwrap_or(defaults.run_as_user),
            shell: file.executor.shell.unwrap_or(defaults.shell),
        };

        Ok(Self {
            selection,
            source,
            concurrency,
            seed: cli.seed.or(file.generation.seed),
            logging,
            backend: cli.backend.or(file.orchestrator.backend).unwrap_or_default(),
            nomad,
            executor,
            name_pattern: file
                .targets
                .name_pattern
                .unwrap_or_else(|| DEFAULT_NAME_PATTERN.to_string()),
            owner_meta_key: file
                .targets
                .owner_meta_key
                .unwrap_or_else(|| DEFAULT_OWNER_META_KEY.to_string()),
        })
    }
}

/// Characters that need no quoting in a `bash -c` word.
fn is_shell_safe_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "/._-+~@%,:=".contains(c)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
