// src/shell/stats.rs

//! On-demand process inspection via `/proc`.
//!
//! Resource stats are computed at query time rather than by a continuous
//! background poller, so idle tasks cost nothing between queries. The
//! process start time (in clock ticks since boot) doubles as the identity
//! fingerprint used to detect pid reuse across daemon restarts.

use nix::errno::Errno;
use nix::sys::signal::kill;
use procfs::Current;
use nix::unistd::Pid;
use serde::Serialize;

use crate::task::{TaskKind, TaskRecord};

/// Point-in-time stats for one process.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessStats {
    pub alive: bool,
    /// Lifetime-average CPU usage, percent of one core.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f64>,
    /// Resident set size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_rss: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_threads: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_secs: Option<f64>,
}

/// Aggregate stats across every running shell, for the daemon-level view.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregateStats {
    pub num_tasks: usize,
    pub num_running: usize,
    pub num_adopted: usize,
    pub cpu_percent: f64,
    pub memory_rss: u64,
    pub pids: Vec<i32>,
}

/// Whether a pid refers to a live process.
///
/// `EPERM` means the process exists but belongs to someone else; that still
/// counts as alive.
pub fn pid_alive(pid: i32) -> bool {
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// `/proc` start time of a process, in clock ticks since boot.
pub fn start_ticks(pid: i32) -> Option<u64> {
    let proc = procfs::process::Process::new(pid).ok()?;
    let stat = proc.stat().ok()?;
    Some(stat.starttime as u64)
}

/// Whether the process behind `pid` is alive and is still the process we
/// recorded (same start time). A record without a fingerprint cannot be
/// verified and never matches.
pub fn fingerprint_matches(pid: i32, recorded_ticks: Option<u64>) -> bool {
    let Some(recorded) = recorded_ticks else {
        return false;
    };
    if !pid_alive(pid) {
        return false;
    }
    start_ticks(pid) == Some(recorded)
}

/// Sample stats for one process. Missing `/proc` data degrades to
/// `alive = false` or partial fields rather than an error.
pub fn sample(pid: i32) -> ProcessStats {
    let mut stats = ProcessStats {
        alive: pid_alive(pid),
        ..ProcessStats::default()
    };
    if !stats.alive {
        return stats;
    }
    let Ok(proc) = procfs::process::Process::new(pid) else {
        return stats;
    };
    let Ok(stat) = proc.stat() else {
        return stats;
    };

    let tps = procfs::ticks_per_second() as f64;
    let page_size = procfs::page_size();

    stats.memory_rss = Some(stat.rss as u64 * page_size);
    stats.num_threads = Some(stat.num_threads);

    if let Ok(uptime) = procfs::Uptime::current() {
        let age = uptime.uptime - stat.starttime as f64 / tps;
        if age > 0.0 {
            let cpu_secs = (stat.utime + stat.stime) as f64 / tps;
            stats.uptime_secs = Some(age);
            stats.cpu_percent = Some(100.0 * cpu_secs / age);
        }
    }
    stats
}

/// Aggregate stats over a set of records (shells only).
pub fn aggregate(records: &[TaskRecord]) -> AggregateStats {
    let mut agg = AggregateStats::default();
    for record in records {
        if record.kind != TaskKind::Shell {
            continue;
        }
        agg.num_tasks += 1;
        if record.adopted {
            agg.num_adopted += 1;
        }
        let Some(pid) = record.pid else { continue };
        let stats = sample(pid);
        if !stats.alive {
            continue;
        }
        agg.num_running += 1;
        agg.pids.push(pid);
        agg.cpu_percent += stats.cpu_percent.unwrap_or(0.0);
        agg.memory_rss += stats.memory_rss.unwrap_or(0);
    }
    agg
}
