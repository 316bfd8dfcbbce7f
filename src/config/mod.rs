// src/config/mod.rs

//! Configuration: TOML model, loading, validation.

pub mod loader;
pub mod model;
pub mod validate;

pub use model::{
    AuthSection, ConfigFile, JobSection, LimitsSection, RawConfigFile, RetentionSection,
    ServerSection, ShellSection, StateSection,
};
