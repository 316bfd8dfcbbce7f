// tests/shell_lifecycle.rs

mod common;
use crate::common::{
    builders::build_orchestrator, init_tracing, temp_config, temp_config_builder,
    wait_for_status, wait_terminal,
};

use std::error::Error;
use std::time::{Duration, Instant};

use taskwarden::errors::OrchestratorError;
use taskwarden::orchestrator::CreateTask;
use taskwarden::task::{ShellSpec, TaskAction, TaskStatus};

type TestResult = Result<(), Box<dyn Error>>;

fn shell_request(command: &[&str]) -> CreateTask {
    CreateTask::Shell {
        spec: ShellSpec {
            command: command.iter().map(|s| s.to_string()).collect(),
            cwd: Some(".".to_string()),
            env: Default::default(),
            pty: false,
        },
        label: None,
        autostart: false,
    }
}

#[tokio::test]
async fn short_shell_completes_with_captured_logs() -> TestResult {
    init_tracing();
    let (cfg, _dir) = temp_config();
    let orch = build_orchestrator(cfg, vec![]);

    let summary = orch
        .create(
            shell_request(&["sh", "-c", "for i in 1 2 3 4 5; do echo line$i; done"]),
            None,
        )
        .await?;
    let detail = wait_for_status(&orch, &summary.id, TaskStatus::Completed).await;
    assert_eq!(detail.record.exit_code, Some(0));

    // Readers drain asynchronously; poll until all lines landed.
    for _ in 0..100 {
        let logs = orch.get(&summary.id, true, 10)?.logs.expect("logs requested");
        if logs.stdout_tail.len() == 5 {
            assert_eq!(
                logs.stdout_tail,
                vec!["line1", "line2", "line3", "line4", "line5"]
            );
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("stdout lines were not captured in time");
}

#[tokio::test]
async fn log_tail_is_bounded_and_in_emission_order() -> TestResult {
    init_tracing();
    let (builder, _dir) = temp_config_builder();
    let cfg = builder.with_log_buffer_lines(20).build();
    let orch = build_orchestrator(cfg, vec![]);

    let summary = orch
        .create(
            shell_request(&["sh", "-c", "i=1; while [ $i -le 50 ]; do echo line$i; i=$((i+1)); done"]),
            None,
        )
        .await?;
    wait_for_status(&orch, &summary.id, TaskStatus::Completed).await;

    for _ in 0..100 {
        let logs = orch.get(&summary.id, true, 5)?.logs.expect("logs requested");
        if logs.stdout_tail.len() == 5 && logs.stdout_tail[4] == "line50" {
            // Ring capacity 20, tail 5: the most recent lines, in order.
            assert_eq!(
                logs.stdout_tail,
                vec!["line46", "line47", "line48", "line49", "line50"]
            );
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected tail did not settle");
}

#[tokio::test]
async fn stderr_is_captured_separately() -> TestResult {
    init_tracing();
    let (cfg, _dir) = temp_config();
    let orch = build_orchestrator(cfg, vec![]);

    let summary = orch
        .create(shell_request(&["sh", "-c", "echo out; echo err >&2"]), None)
        .await?;
    wait_for_status(&orch, &summary.id, TaskStatus::Completed).await;

    for _ in 0..100 {
        let logs = orch.get(&summary.id, true, 10)?.logs.expect("logs requested");
        if !logs.stdout_tail.is_empty() && !logs.stderr_tail.is_empty() {
            assert_eq!(logs.stdout_tail, vec!["out"]);
            assert_eq!(logs.stderr_tail, vec!["err"]);
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("streams were not captured in time");
}

#[tokio::test]
async fn graceful_stop_walks_through_stopping_to_stopped() -> TestResult {
    init_tracing();
    let (builder, _dir) = temp_config_builder();
    let cfg = builder.with_stop_grace_secs(5).build();
    let orch = build_orchestrator(cfg, vec![]);

    let summary = orch.create(shell_request(&["sleep", "5"]), None).await?;
    assert_eq!(summary.status, TaskStatus::Running);
    let detail = orch.get(&summary.id, false, 0)?;
    assert!(detail.record.pid.is_some(), "running shell must expose a pid");

    tokio::time::sleep(Duration::from_millis(100)).await;
    let started = Instant::now();
    let after_action = orch.action(&summary.id, TaskAction::Stop, None).await?;
    // Fire-and-forget: the action returns once the signal is issued.
    assert!(matches!(
        after_action.status,
        TaskStatus::Stopping | TaskStatus::Stopped
    ));

    let detail = wait_terminal(&orch, &summary.id).await;
    assert_eq!(detail.record.status, TaskStatus::Stopped);
    // SIGTERM death is recorded as the negated signal number.
    assert_eq!(detail.record.exit_code, Some(-15));
    assert!(detail.record.pid.is_none());
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "graceful stop of `sleep` must finish well within the grace period"
    );
    Ok(())
}

#[tokio::test]
async fn kill_is_immediate_and_idempotent() -> TestResult {
    init_tracing();
    let (cfg, _dir) = temp_config();
    let orch = build_orchestrator(cfg, vec![]);

    let summary = orch.create(shell_request(&["sleep", "30"]), None).await?;
    orch.action(&summary.id, TaskAction::Kill, None).await?;
    let detail = wait_terminal(&orch, &summary.id).await;
    assert_eq!(detail.record.status, TaskStatus::Stopped);
    assert_eq!(detail.record.exit_code, Some(-9));

    // A second kill (and a stop) on the finished task is a no-op success.
    orch.action(&summary.id, TaskAction::Kill, None).await?;
    let after = orch.action(&summary.id, TaskAction::Stop, None).await?;
    assert_eq!(after.status, TaskStatus::Stopped);
    Ok(())
}

#[tokio::test]
async fn cancel_kills_and_records_cancelled() -> TestResult {
    init_tracing();
    let (cfg, _dir) = temp_config();
    let orch = build_orchestrator(cfg, vec![]);

    let summary = orch.create(shell_request(&["sleep", "30"]), None).await?;
    orch.action(&summary.id, TaskAction::Cancel, None).await?;
    let detail = wait_terminal(&orch, &summary.id).await;
    assert_eq!(detail.record.status, TaskStatus::Cancelled);
    assert!(detail.record.cancel_requested);
    Ok(())
}

#[tokio::test]
async fn shell_concurrency_limit_frees_up_after_exit() -> TestResult {
    init_tracing();
    let (builder, _dir) = temp_config_builder();
    let cfg = builder.with_max_shells(1).build();
    let orch = build_orchestrator(cfg, vec![]);

    let first = orch.create(shell_request(&["sleep", "30"]), None).await?;
    let err = orch
        .create(shell_request(&["sleep", "30"]), None)
        .await
        .expect_err("second live shell must exceed the cap");
    assert!(matches!(err, OrchestratorError::ConcurrencyLimit(_)));

    orch.action(&first.id, TaskAction::Kill, None).await?;
    wait_terminal(&orch, &first.id).await;

    let third = orch.create(shell_request(&["sleep", "1"]), None).await?;
    assert_eq!(third.status, TaskStatus::Running);
    orch.action(&third.id, TaskAction::Kill, None).await?;
    wait_terminal(&orch, &third.id).await;
    Ok(())
}

#[tokio::test]
async fn restart_begins_a_new_run_under_the_same_id() -> TestResult {
    init_tracing();
    let (cfg, _dir) = temp_config();
    let orch = build_orchestrator(cfg, vec![]);

    let summary = orch.create(shell_request(&["sleep", "30"]), None).await?;
    let first_pid = orch.get(&summary.id, false, 0)?.record.pid;
    assert_eq!(summary.run_id, 1);

    let restarted = orch.action(&summary.id, TaskAction::Restart, None).await?;
    assert_eq!(restarted.id, summary.id);
    assert_eq!(restarted.run_id, 2);
    assert_eq!(restarted.status, TaskStatus::Running);
    let second_pid = orch.get(&summary.id, false, 0)?.record.pid;
    assert!(second_pid.is_some());
    assert_ne!(first_pid, second_pid);

    orch.action(&summary.id, TaskAction::Kill, None).await?;
    wait_terminal(&orch, &summary.id).await;
    Ok(())
}

#[tokio::test]
async fn nonzero_exit_is_recorded_as_failed() -> TestResult {
    init_tracing();
    let (cfg, _dir) = temp_config();
    let orch = build_orchestrator(cfg, vec![]);

    let summary = orch
        .create(shell_request(&["sh", "-c", "exit 3"]), None)
        .await?;
    let detail = wait_terminal(&orch, &summary.id).await;
    assert_eq!(detail.record.status, TaskStatus::Failed);
    assert_eq!(detail.record.exit_code, Some(3));
    assert!(detail.record.error.is_some());
    Ok(())
}

#[tokio::test]
async fn unspawnable_command_is_recorded_not_propagated() -> TestResult {
    init_tracing();
    let (cfg, _dir) = temp_config();
    let orch = build_orchestrator(cfg, vec![]);

    // The create call itself succeeds; the failure lands on the record.
    let summary = orch
        .create(shell_request(&["/definitely/not/a/binary"]), None)
        .await?;
    assert_eq!(summary.status, TaskStatus::Failed);
    let detail = orch.get(&summary.id, false, 0)?;
    assert!(detail.record.error.as_deref().unwrap_or("").contains("spawn failed"));
    Ok(())
}

#[tokio::test]
async fn empty_command_is_a_validation_error() -> TestResult {
    init_tracing();
    let (cfg, _dir) = temp_config();
    let orch = build_orchestrator(cfg, vec![]);

    let err = orch
        .create(shell_request(&[]), None)
        .await
        .expect_err("empty command must be rejected");
    assert!(matches!(err, OrchestratorError::Validation(_)));
    Ok(())
}

#[tokio::test]
async fn live_output_fans_out_to_subscribers() -> TestResult {
    init_tracing();
    let (cfg, _dir) = temp_config();
    let orch = build_orchestrator(cfg, vec![]);

    let summary = orch
        .create(
            shell_request(&["sh", "-c", "sleep 0.2; echo one; echo two"]),
            None,
        )
        .await?;
    let mut rx = orch.subscribe_output(&summary.id)?;

    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await??;
    let second = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await??;
    assert_eq!(first.text, "one");
    assert_eq!(second.text, "two");
    wait_terminal(&orch, &summary.id).await;
    Ok(())
}

#[tokio::test]
async fn pty_shell_combines_output_and_accepts_stdin() -> TestResult {
    init_tracing();
    let (cfg, _dir) = temp_config();
    let orch = build_orchestrator(cfg, vec![]);

    let summary = orch
        .create(
            CreateTask::Shell {
                spec: ShellSpec {
                    command: vec!["cat".to_string()],
                    cwd: Some(".".to_string()),
                    env: Default::default(),
                    pty: true,
                },
                label: Some("interactive".to_string()),
                autostart: false,
            },
            None,
        )
        .await?;
    assert_eq!(summary.status, TaskStatus::Running);

    orch.write_stdin(&summary.id, b"hello-pty\n", None)?;

    // `cat` under a pty echoes the line back into the combined stream.
    let mut seen = false;
    for _ in 0..200 {
        let logs = orch.get(&summary.id, true, 20)?.logs.expect("logs requested");
        if logs.stdout_tail.iter().any(|line| line.contains("hello-pty")) {
            seen = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(seen, "pty output should contain the echoed stdin line");

    orch.action(&summary.id, TaskAction::Kill, None).await?;
    wait_terminal(&orch, &summary.id).await;
    Ok(())
}
