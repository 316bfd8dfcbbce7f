// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [server]
/// listen = "127.0.0.1:8737"
///
/// [limits]
/// max_shells = 5
/// max_jobs = 4
/// job_queue_length = 16
///
/// [shell]
/// stop_grace_period_secs = 5
/// log_buffer_lines = 1000
/// ```
///
/// All sections are optional and have reasonable defaults. This raw form is
/// validated into [`ConfigFile`] via `TryFrom` before the rest of the
/// application sees it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub state: StateSection,

    #[serde(default)]
    pub limits: LimitsSection,

    #[serde(default)]
    pub shell: ShellSection,

    #[serde(default)]
    pub job: JobSection,

    #[serde(default)]
    pub retention: RetentionSection,

    #[serde(default)]
    pub auth: AuthSection,
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    /// Socket address the HTTP API binds to.
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    "127.0.0.1:8737".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// `[state]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateSection {
    /// Directory holding the task snapshot.
    ///
    /// If `None`, `~/.cache/taskwarden` is used.
    #[serde(default)]
    pub dir: Option<String>,
}

/// `[limits]` section: concurrency caps per task kind.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsSection {
    /// Maximum number of concurrently live shell processes.
    #[serde(default = "default_max_shells")]
    pub max_shells: usize,

    /// Maximum number of concurrently running job worker threads.
    #[serde(default = "default_max_jobs")]
    pub max_jobs: usize,

    /// FIFO queue depth for jobs waiting on a free slot; submissions beyond
    /// this are rejected outright.
    #[serde(default = "default_job_queue_length")]
    pub job_queue_length: usize,
}

fn default_max_shells() -> usize {
    5
}

fn default_max_jobs() -> usize {
    4
}

fn default_job_queue_length() -> usize {
    16
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_shells: default_max_shells(),
            max_jobs: default_max_jobs(),
            job_queue_length: default_job_queue_length(),
        }
    }
}

/// `[shell]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ShellSection {
    /// Grace period between SIGTERM and the SIGKILL escalation on `stop`.
    #[serde(default = "default_stop_grace_period_secs")]
    pub stop_grace_period_secs: u64,

    /// Ring buffer capacity, in lines, per output stream.
    #[serde(default = "default_log_buffer_lines")]
    pub log_buffer_lines: usize,
}

fn default_stop_grace_period_secs() -> u64 {
    5
}

fn default_log_buffer_lines() -> usize {
    1000
}

impl Default for ShellSection {
    fn default() -> Self {
        Self {
            stop_grace_period_secs: default_stop_grace_period_secs(),
            log_buffer_lines: default_log_buffer_lines(),
        }
    }
}

/// `[job]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct JobSection {
    /// External extractor binary used by the `extract_archive` handler.
    #[serde(default = "default_extract_tool")]
    pub extract_tool: String,
}

fn default_extract_tool() -> String {
    "7zz".to_string()
}

impl Default for JobSection {
    fn default() -> Self {
        Self {
            extract_tool: default_extract_tool(),
        }
    }
}

/// `[retention]` section: automatic pruning of terminal tasks.
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionSection {
    /// Maximum number of terminal tasks retained.
    #[serde(default = "default_max_finished")]
    pub max_finished: usize,

    /// Terminal tasks older than this are pruned.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
}

fn default_max_finished() -> usize {
    200
}

fn default_max_age_secs() -> u64 {
    86_400
}

impl Default for RetentionSection {
    fn default() -> Self {
        Self {
            max_finished: default_max_finished(),
            max_age_secs: default_max_age_secs(),
        }
    }
}

/// `[auth]` section.
///
/// When a token is configured (here or via `TASKWARDEN_TOKEN`), every
/// mutating API call must present it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthSection {
    #[serde(default)]
    pub token: Option<String>,
}

/// Validated configuration used by the rest of the application.
///
/// Construct via `ConfigFile::try_from(raw)` (see `validate.rs`) or
/// [`ConfigFile::default`] in tests.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub server: ServerSection,
    pub state: StateSection,
    pub limits: LimitsSection,
    pub shell: ShellSection,
    pub job: JobSection,
    pub retention: RetentionSection,
    pub auth: AuthSection,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new_unchecked(RawConfigFile::default())
    }
}

impl ConfigFile {
    /// Assemble without validation; only `validate.rs` and `Default` call
    /// this.
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            server: raw.server,
            state: raw.state,
            limits: raw.limits,
            shell: raw.shell,
            job: raw.job,
            retention: raw.retention,
            auth: raw.auth,
        }
    }

    pub fn stop_grace_period(&self) -> Duration {
        Duration::from_secs(self.shell.stop_grace_period_secs)
    }

    /// State directory, defaulting to `~/.cache/taskwarden`.
    pub fn state_dir(&self) -> PathBuf {
        match &self.state.dir {
            Some(dir) => PathBuf::from(dir),
            None => dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("taskwarden"),
        }
    }

    /// Snapshot file path inside the state directory.
    pub fn snapshot_path(&self) -> PathBuf {
        self.state_dir().join("tasks.json")
    }

    /// Effective auth token: `TASKWARDEN_TOKEN` overrides the config value.
    pub fn effective_auth_token(&self) -> Option<String> {
        std::env::var("TASKWARDEN_TOKEN")
            .ok()
            .filter(|token| !token.is_empty())
            .or_else(|| self.auth.token.clone())
    }
}
