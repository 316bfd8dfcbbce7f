// src/shell/mod.rs

//! Process executor: spawns and supervises OS-process-backed tasks.

pub mod executor;
pub mod stats;

pub use executor::ShellExecutor;
pub use stats::{AggregateStats, ProcessStats};
