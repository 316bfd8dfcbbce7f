#![allow(dead_code)]

use std::sync::Arc;

use taskwarden::config::{ConfigFile, RawConfigFile};
use taskwarden::job::handlers::builtin_registry;
use taskwarden::job::JobHandler;
use taskwarden::orchestrator::Orchestrator;
use taskwarden::registry::JsonSnapshotStore;

/// Builder for `ConfigFile` to simplify test setup.
///
/// Tests should always set a state dir (a tempdir) so they never touch the
/// user's real cache directory.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_state_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.state.dir = Some(dir.into());
        self
    }

    pub fn with_listen(mut self, addr: &str) -> Self {
        self.config.server.listen = addr.to_string();
        self
    }

    pub fn with_max_shells(mut self, val: usize) -> Self {
        self.config.limits.max_shells = val;
        self
    }

    pub fn with_max_jobs(mut self, val: usize) -> Self {
        self.config.limits.max_jobs = val;
        self
    }

    pub fn with_job_queue_length(mut self, val: usize) -> Self {
        self.config.limits.job_queue_length = val;
        self
    }

    pub fn with_stop_grace_secs(mut self, val: u64) -> Self {
        self.config.shell.stop_grace_period_secs = val;
        self
    }

    pub fn with_log_buffer_lines(mut self, val: usize) -> Self {
        self.config.shell.log_buffer_lines = val;
        self
    }

    pub fn with_retention(mut self, max_finished: usize, max_age_secs: u64) -> Self {
        self.config.retention.max_finished = max_finished;
        self.config.retention.max_age_secs = max_age_secs;
        self
    }

    pub fn with_auth_token(mut self, token: &str) -> Self {
        self.config.auth.token = Some(token.to_string());
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Orchestrator wired with a JSON snapshot store in the config's state dir,
/// the built-in handlers, and any extra test handlers.
pub fn build_orchestrator(
    config: ConfigFile,
    extra_handlers: Vec<Arc<dyn JobHandler>>,
) -> Orchestrator {
    let store = JsonSnapshotStore::new(config.snapshot_path());
    let mut handlers = builtin_registry(&config);
    for handler in extra_handlers {
        handlers.register(handler);
    }
    Orchestrator::new(config, Box::new(store), handlers)
}
