// src/registry/recovery.rs

//! Startup recovery reconciliation.
//!
//! Persisted records are compared against actual live OS state before they
//! re-enter the registry:
//!
//! - A shell recorded `running`/`stopping` whose pid is alive *and* whose
//!   `/proc` start-time fingerprint matches is **adopted**: it stays running
//!   and a watcher re-supervises it (see `shell::executor`).
//! - A shell whose process is gone, or whose pid was reused by an unrelated
//!   process, becomes terminal `unknown` with an explanatory note. A stale
//!   record must never be reported as `running` again.
//! - A shell still `pending` never actually started; it becomes `unknown`.
//! - A job found `pending`/`running` was interrupted by the restart and is
//!   marked `failed` (jobs are not restartable; a retry is a new submit).

use tracing::{info, warn};

use crate::shell::stats;
use crate::task::{TaskKind, TaskRecord, TaskStatus};

/// Reconcile one persisted record against live OS state.
pub fn reconcile(mut record: TaskRecord) -> TaskRecord {
    if record.status.is_terminal() {
        return record;
    }
    match record.kind {
        TaskKind::Job => {
            warn!(task = %record.id, status = ?record.status, "job interrupted by restart");
            record.mark_failed("Job interrupted by restart");
            record
        }
        TaskKind::Shell => reconcile_shell(record),
    }
}

fn reconcile_shell(mut record: TaskRecord) -> TaskRecord {
    if record.status == TaskStatus::Pending {
        record.mark_unknown("interrupted before the process was started");
        return record;
    }

    let pid = match record.pid {
        Some(pid) => pid,
        None => {
            record.mark_unknown("recorded as running without a pid");
            return record;
        }
    };

    if stats::fingerprint_matches(pid, record.start_ticks) {
        info!(task = %record.id, pid, "adopting still-live shell process");
        record.adopted = true;
        record.status_note = Some("re-attached to a live process at startup".to_string());
        record
    } else {
        warn!(task = %record.id, pid, "recorded process is gone or pid was reused");
        record.mark_unknown(
            "process no longer matches the recorded fingerprint; reconciled at startup",
        );
        record
    }
}
