// tests/job_lifecycle.rs

mod common;
use crate::common::{
    builders::build_orchestrator, controllable::ControllableHandler, init_tracing,
    temp_config, temp_config_builder, wait_for_status, wait_terminal,
};

use std::error::Error;
use std::time::Duration;

use serde_json::json;

use taskwarden::errors::OrchestratorError;
use taskwarden::orchestrator::CreateTask;
use taskwarden::task::{JobSpec, TaskAction, TaskStatus};

type TestResult = Result<(), Box<dyn Error>>;

fn job_request(job_type: &str, params: serde_json::Value) -> CreateTask {
    CreateTask::Job {
        spec: JobSpec {
            job_type: job_type.to_string(),
            params,
        },
        label: None,
    }
}

#[tokio::test]
async fn noop_job_completes() -> TestResult {
    init_tracing();
    let (cfg, _dir) = temp_config();
    let orch = build_orchestrator(cfg, vec![]);

    let summary = orch
        .create(job_request("noop", json!({ "duration_ms": 0 })), None)
        .await?;
    let detail = wait_for_status(&orch, &summary.id, TaskStatus::Completed).await;

    assert_eq!(detail.record.status, TaskStatus::Completed);
    let progress = detail.record.progress.expect("noop reports progress");
    assert_eq!(progress.completed, progress.total);
    Ok(())
}

#[tokio::test]
async fn unknown_job_type_is_rejected_before_any_record_exists() -> TestResult {
    init_tracing();
    let (cfg, _dir) = temp_config();
    let orch = build_orchestrator(cfg, vec![]);

    let err = orch
        .create(job_request("no_such_handler", json!({})), None)
        .await
        .expect_err("unknown job type must be rejected");
    assert!(matches!(err, OrchestratorError::Validation(_)));
    assert!(orch.list().is_empty());
    Ok(())
}

#[tokio::test]
async fn job_cap_runs_exactly_n_and_queues_the_rest() -> TestResult {
    init_tracing();
    let (builder, _dir) = temp_config_builder();
    let cfg = builder.with_max_jobs(2).with_job_queue_length(8).build();
    let handler = ControllableHandler::new();
    let orch = build_orchestrator(cfg, vec![handler.as_handler()]);

    let mut ids = Vec::new();
    for _ in 0..3 {
        let summary = orch
            .create(job_request("controllable", json!({})), None)
            .await?;
        ids.push(summary.id);
    }

    handler.wait_for_started(2).await;
    // Give the dispatcher a moment to (incorrectly) start a third run.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handler.started(), 2, "cap of 2 must never be exceeded");

    let running = orch
        .list()
        .iter()
        .filter(|s| s.status == TaskStatus::Running)
        .count();
    assert_eq!(running, 2);

    handler.release_all();
    for id in &ids {
        let detail = wait_terminal(&orch, id).await;
        assert_eq!(detail.record.status, TaskStatus::Completed);
    }
    assert_eq!(handler.finished(), 3, "queued job must not be dropped");
    Ok(())
}

#[tokio::test]
async fn submissions_beyond_the_queue_bound_are_rejected() -> TestResult {
    init_tracing();
    let (builder, _dir) = temp_config_builder();
    let cfg = builder.with_max_jobs(1).with_job_queue_length(1).build();
    let handler = ControllableHandler::new();
    let orch = build_orchestrator(cfg, vec![handler.as_handler()]);

    let first = orch
        .create(job_request("controllable", json!({})), None)
        .await?;
    handler.wait_for_started(1).await;

    // One job running, one slot in the dispatcher's hand, one queue slot:
    // with 5 more submissions at least one must hit the hard bound.
    let mut accepted = vec![first.id];
    let mut rejected = 0;
    for _ in 0..5 {
        match orch
            .create(job_request("controllable", json!({})), None)
            .await
        {
            Ok(summary) => accepted.push(summary.id),
            Err(OrchestratorError::ConcurrencyLimit(_)) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert!(rejected >= 1, "queue bound must reject overflow");

    // Nothing ran past the cap while the first job was pinned.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handler.started(), 1);

    // Accepted submissions are never silently dropped.
    handler.release_all();
    for id in &accepted {
        let detail = wait_terminal(&orch, id).await;
        assert_eq!(detail.record.status, TaskStatus::Completed);
    }
    Ok(())
}

#[tokio::test]
async fn cancel_while_queued_never_runs() -> TestResult {
    init_tracing();
    let (builder, _dir) = temp_config_builder();
    let cfg = builder.with_max_jobs(1).with_job_queue_length(4).build();
    let handler = ControllableHandler::new();
    let orch = build_orchestrator(cfg, vec![handler.as_handler()]);

    let running = orch
        .create(job_request("controllable", json!({})), None)
        .await?;
    handler.wait_for_started(1).await;
    let queued = orch
        .create(job_request("controllable", json!({})), None)
        .await?;

    orch.action(&queued.id, TaskAction::Cancel, None).await?;
    handler.release_all();

    let detail = wait_terminal(&orch, &queued.id).await;
    assert_eq!(detail.record.status, TaskStatus::Cancelled);
    assert!(detail.record.cancel_requested);

    let detail = wait_terminal(&orch, &running.id).await;
    assert_eq!(detail.record.status, TaskStatus::Completed);
    // The cancelled job never reached its handler.
    assert_eq!(handler.started(), 1);
    Ok(())
}

#[tokio::test]
async fn cancel_running_job_is_observed_cooperatively() -> TestResult {
    init_tracing();
    let (cfg, _dir) = temp_config();
    let handler = ControllableHandler::new();
    let orch = build_orchestrator(cfg, vec![handler.as_handler()]);

    let summary = orch
        .create(job_request("controllable", json!({})), None)
        .await?;
    handler.wait_for_started(1).await;

    orch.action(&summary.id, TaskAction::Cancel, None).await?;
    let detail = wait_terminal(&orch, &summary.id).await;
    assert_eq!(detail.record.status, TaskStatus::Cancelled);
    assert_eq!(handler.finished(), 0);
    Ok(())
}

#[tokio::test]
async fn cancelling_a_finished_job_is_already_terminal() -> TestResult {
    init_tracing();
    let (cfg, _dir) = temp_config();
    let orch = build_orchestrator(cfg, vec![]);

    let summary = orch
        .create(job_request("noop", json!({ "duration_ms": 0 })), None)
        .await?;
    wait_for_status(&orch, &summary.id, TaskStatus::Completed).await;

    let err = orch
        .action(&summary.id, TaskAction::Cancel, None)
        .await
        .expect_err("cancel after completion must fail");
    assert!(matches!(err, OrchestratorError::AlreadyTerminal(_)));
    Ok(())
}

#[tokio::test]
async fn bulk_copy_partial_failure_still_completes() -> TestResult {
    init_tracing();
    let (cfg, _dir) = temp_config();
    let orch = build_orchestrator(cfg, vec![]);

    let work = tempfile::TempDir::new()?;
    let src_a = work.path().join("a.txt");
    let src_b = work.path().join("b.txt");
    let missing = work.path().join("missing.txt");
    std::fs::write(&src_a, "alpha")?;
    std::fs::write(&src_b, "beta")?;
    let dest = work.path().join("dest");

    let params = json!({
        "sources": [src_a, missing, src_b],
        "destination": dest,
    });
    let summary = orch.create(job_request("bulk_copy", params), None).await?;
    let detail = wait_terminal(&orch, &summary.id).await;

    // One missing item is a partial failure, not a failed job.
    assert_eq!(detail.record.status, TaskStatus::Completed);
    let report = detail.record.result.expect("batch jobs report a result");
    assert_eq!(report["succeeded"], 2);
    assert_eq!(report["failed"], 1);
    assert_eq!(report["errors"].as_array().map(Vec::len), Some(1));
    assert!(dest.join("a.txt").is_file());
    assert!(dest.join("b.txt").is_file());
    Ok(())
}

#[tokio::test]
async fn bulk_copy_with_every_item_missing_fails() -> TestResult {
    init_tracing();
    let (cfg, _dir) = temp_config();
    let orch = build_orchestrator(cfg, vec![]);

    let work = tempfile::TempDir::new()?;
    let params = json!({
        "sources": [work.path().join("nope1"), work.path().join("nope2")],
        "destination": work.path().join("dest"),
    });
    let summary = orch.create(job_request("bulk_copy", params), None).await?;
    let detail = wait_terminal(&orch, &summary.id).await;

    assert_eq!(detail.record.status, TaskStatus::Failed);
    let report = detail.record.result.expect("report kept on failure too");
    assert_eq!(report["succeeded"], 0);
    assert_eq!(report["failed"], 2);
    Ok(())
}

#[tokio::test]
async fn removing_a_running_job_requires_force() -> TestResult {
    init_tracing();
    let (cfg, _dir) = temp_config();
    let handler = ControllableHandler::new();
    let orch = build_orchestrator(cfg, vec![handler.as_handler()]);

    let summary = orch
        .create(job_request("controllable", json!({})), None)
        .await?;
    handler.wait_for_started(1).await;

    let err = orch
        .remove(&summary.id, false, None)
        .await
        .expect_err("removing a running job without force must fail");
    assert!(matches!(err, OrchestratorError::Validation(_)));

    orch.remove(&summary.id, true, None).await?;
    assert!(orch.get(&summary.id, false, 0).is_err());
    handler.release_all();
    Ok(())
}
