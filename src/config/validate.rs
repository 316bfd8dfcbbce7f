// src/config/validate.rs

use std::net::SocketAddr;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{OrchestratorError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::OrchestratorError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_listen_addr(cfg)?;
    validate_limits(cfg)?;
    validate_shell(cfg)?;
    validate_retention(cfg)?;
    Ok(())
}

fn validate_listen_addr(cfg: &RawConfigFile) -> Result<()> {
    cfg.server
        .listen
        .parse::<SocketAddr>()
        .map_err(|_| {
            OrchestratorError::Config(format!(
                "[server].listen is not a valid socket address: '{}'",
                cfg.server.listen
            ))
        })
        .map(|_| ())
}

fn validate_limits(cfg: &RawConfigFile) -> Result<()> {
    if cfg.limits.max_shells == 0 {
        return Err(OrchestratorError::Config(
            "[limits].max_shells must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.limits.max_jobs == 0 {
        return Err(OrchestratorError::Config(
            "[limits].max_jobs must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.limits.job_queue_length == 0 {
        return Err(OrchestratorError::Config(
            "[limits].job_queue_length must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_shell(cfg: &RawConfigFile) -> Result<()> {
    if cfg.shell.log_buffer_lines == 0 {
        return Err(OrchestratorError::Config(
            "[shell].log_buffer_lines must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_retention(cfg: &RawConfigFile) -> Result<()> {
    if cfg.retention.max_finished == 0 {
        return Err(OrchestratorError::Config(
            "[retention].max_finished must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}
