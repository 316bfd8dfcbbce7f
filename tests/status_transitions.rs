// tests/status_transitions.rs

//! Property test: no sequence of lifecycle events can drive a record
//! backwards through the status graph or out of its invariants.

use proptest::prelude::*;

use taskwarden::task::{ShellSpec, TaskRecord, TaskStatus};

const ALL_STATUSES: [TaskStatus; 8] = [
    TaskStatus::Pending,
    TaskStatus::Running,
    TaskStatus::Stopping,
    TaskStatus::Stopped,
    TaskStatus::Completed,
    TaskStatus::Failed,
    TaskStatus::Cancelled,
    TaskStatus::Unknown,
];

fn fresh_record() -> TaskRecord {
    TaskRecord::new_shell(
        ShellSpec {
            command: vec!["sleep".to_string(), "1".to_string()],
            cwd: None,
            env: Default::default(),
            pty: false,
        },
        None,
        false,
    )
}

/// Apply one random lifecycle event. Returns `true` if the event begins a
/// new run (which legitimately resets the status path).
fn apply_op(record: &mut TaskRecord, op: u8) -> bool {
    match op % 8 {
        0 => {
            record.mark_running(Some(4242), Some(7));
        }
        1 => {
            record.mark_stopping();
        }
        2 => {
            record.mark_stopped(Some(0));
        }
        3 => {
            record.mark_completed(Some(0), None);
        }
        4 => {
            record.mark_failed("boom");
        }
        5 => {
            record.mark_cancelled(None);
        }
        6 => {
            record.mark_unknown("reconciled");
        }
        _ => {
            // Restart is only legal once the previous run is terminal.
            if record.status.is_terminal() {
                record.begin_new_run();
                return true;
            }
        }
    }
    false
}

proptest! {
    #[test]
    fn random_event_sequences_never_regress(ops in proptest::collection::vec(any::<u8>(), 1..64)) {
        let mut record = fresh_record();
        let mut prev = record.status;

        for op in ops {
            let new_run = apply_op(&mut record, op);
            let next = record.status;

            if new_run {
                prop_assert_eq!(next, TaskStatus::Pending);
            } else {
                // Either the event was refused (status unchanged) or it took
                // a legal forward edge.
                prop_assert!(
                    next == prev || prev.can_advance_to(next),
                    "illegal transition {:?} -> {:?}", prev, next
                );
            }

            // pid is non-null iff the task is running or stopping.
            if record.pid.is_some() {
                prop_assert!(matches!(
                    record.status,
                    TaskStatus::Running | TaskStatus::Stopping
                ));
            }
            // Terminal records always carry a finish timestamp.
            if record.status.is_terminal() {
                prop_assert!(record.finished_at.is_some());
            }

            prev = next;
        }
    }
}

#[test]
fn terminal_states_have_no_outgoing_edges() {
    for from in ALL_STATUSES {
        if !from.is_terminal() {
            continue;
        }
        for to in ALL_STATUSES {
            assert!(
                !from.can_advance_to(to),
                "terminal {from:?} must not advance to {to:?}"
            );
        }
    }
}

#[test]
fn nothing_advances_back_to_pending() {
    for from in ALL_STATUSES {
        assert!(!from.can_advance_to(TaskStatus::Pending));
    }
}

#[test]
fn graceful_stop_path_is_legal() {
    assert!(TaskStatus::Pending.can_advance_to(TaskStatus::Running));
    assert!(TaskStatus::Running.can_advance_to(TaskStatus::Stopping));
    assert!(TaskStatus::Stopping.can_advance_to(TaskStatus::Stopped));
}

#[test]
fn every_non_terminal_state_can_be_cancelled() {
    for from in ALL_STATUSES {
        if from.is_terminal() {
            continue;
        }
        assert!(
            from.can_advance_to(TaskStatus::Cancelled),
            "{from:?} must allow explicit cancellation"
        );
    }
}

#[test]
fn unknown_is_only_reachable_from_non_terminal_states() {
    for from in ALL_STATUSES {
        assert_eq!(
            from.can_advance_to(TaskStatus::Unknown),
            !from.is_terminal(),
            "unknown reachability wrong for {from:?}"
        );
    }
}
