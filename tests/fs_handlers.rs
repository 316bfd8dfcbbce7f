// tests/fs_handlers.rs

//! Batch handlers driven through the mock filesystem: deterministic partial
//! failures, move semantics, and mid-batch cancellation.

mod common;
use crate::common::{builders::build_orchestrator, init_tracing, temp_config, wait_terminal};

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use taskwarden::fs::mock::MockFileSystem;
use taskwarden::fs::FileSystem;
use taskwarden::job::handlers::{BulkCopyHandler, BulkMoveHandler};
use taskwarden::job::JobHandler;
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
async fn mock_copy_tallies_injected_failures() -> TestResult {
    init_tracing();
    let (cfg, _dir) = temp_config();

    let mock = MockFileSystem::new();
    mock.add_file("/src/a.txt", "alpha");
    mock.add_file("/src/b.txt", "beta");
    mock.add_file("/src/c.txt", "gamma");
    mock.fail_on("/src/b.txt");

    let fs: Arc<dyn FileSystem> = Arc::new(mock.clone());
    let orch = build_orchestrator(cfg, vec![Arc::new(BulkCopyHandler::new(fs))]);

    let params = json!({
        "sources": ["/src/a.txt", "/src/b.txt", "/src/c.txt"],
        "destination": "/dest",
    });
    let summary = orch.create(job_request("bulk_copy", params), None).await?;
    let detail = wait_terminal(&orch, &summary.id).await;

    assert_eq!(detail.record.status, TaskStatus::Completed);
    let report = detail.record.result.expect("batch report");
    assert_eq!(report["succeeded"], 2);
    assert_eq!(report["failed"], 1);
    assert_eq!(report["errors"][0]["path"], "/src/b.txt");
    assert!(mock.contains("/dest/a.txt"));
    assert!(mock.contains("/dest/c.txt"));
    assert!(!mock.contains("/dest/b.txt"));
    Ok(())
}

#[tokio::test]
async fn mock_copy_recurses_into_directories() -> TestResult {
    init_tracing();
    let (cfg, _dir) = temp_config();

    let mock = MockFileSystem::new();
    mock.add_file("/src/tree/one.txt", "1");
    mock.add_file("/src/tree/nested/two.txt", "2");

    let fs: Arc<dyn FileSystem> = Arc::new(mock.clone());
    let orch = build_orchestrator(cfg, vec![Arc::new(BulkCopyHandler::new(fs))]);

    let params = json!({ "sources": ["/src/tree"], "destination": "/dest" });
    let summary = orch.create(job_request("bulk_copy", params), None).await?;
    let detail = wait_terminal(&orch, &summary.id).await;

    assert_eq!(detail.record.status, TaskStatus::Completed);
    assert!(mock.contains("/dest/tree/one.txt"));
    assert!(mock.contains("/dest/tree/nested/two.txt"));
    Ok(())
}

#[tokio::test]
async fn mock_move_removes_the_source() -> TestResult {
    init_tracing();
    let (cfg, _dir) = temp_config();

    let mock = MockFileSystem::new();
    mock.add_file("/src/a.txt", "alpha");
    mock.add_file("/src/gone.txt", "beta");

    let fs: Arc<dyn FileSystem> = Arc::new(mock.clone());
    let orch = build_orchestrator(cfg, vec![Arc::new(BulkMoveHandler::new(fs))]);

    let params = json!({
        "sources": ["/src/a.txt", "/src/missing.txt"],
        "destination": "/dest",
    });
    let summary = orch.create(job_request("bulk_move", params), None).await?;
    let detail = wait_terminal(&orch, &summary.id).await;

    assert_eq!(detail.record.status, TaskStatus::Completed);
    let report = detail.record.result.expect("batch report");
    assert_eq!(report["succeeded"], 1);
    assert_eq!(report["failed"], 1);
    assert!(mock.contains("/dest/a.txt"));
    assert!(!mock.contains("/src/a.txt"), "move must remove the source");
    Ok(())
}

/// Filesystem whose `copy_file` blocks on one path until released, pinning a
/// batch mid-run so cancellation lands deterministically between items.
#[derive(Debug, Clone)]
struct GatedFs {
    inner: MockFileSystem,
    gate_path: PathBuf,
    released: Arc<AtomicBool>,
}

impl GatedFs {
    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

impl FileSystem for GatedFs {
    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }
    fn is_file(&self, path: &Path) -> bool {
        self.inner.is_file(path)
    }
    fn is_dir(&self, path: &Path) -> bool {
        self.inner.is_dir(path)
    }
    fn create_dir_all(&self, path: &Path) -> anyhow::Result<()> {
        self.inner.create_dir_all(path)
    }
    fn copy_file(&self, src: &Path, dest: &Path) -> anyhow::Result<u64> {
        if src == self.gate_path {
            while !self.released.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(10));
            }
        }
        self.inner.copy_file(src, dest)
    }
    fn rename(&self, src: &Path, dest: &Path) -> anyhow::Result<()> {
        self.inner.rename(src, dest)
    }
    fn remove_file(&self, path: &Path) -> anyhow::Result<()> {
        self.inner.remove_file(path)
    }
    fn remove_dir_all(&self, path: &Path) -> anyhow::Result<()> {
        self.inner.remove_dir_all(path)
    }
    fn read_dir(&self, path: &Path) -> anyhow::Result<Vec<PathBuf>> {
        self.inner.read_dir(path)
    }
}

#[tokio::test]
async fn cancelling_a_batch_mid_run_keeps_the_partial_tally() -> TestResult {
    init_tracing();
    let (cfg, _dir) = temp_config();

    let mock = MockFileSystem::new();
    for name in ["f1", "f2", "f3", "f4", "f5"] {
        mock.add_file(format!("/src/{name}"), name);
    }
    let gated = GatedFs {
        inner: mock,
        gate_path: PathBuf::from("/src/f3"),
        released: Arc::new(AtomicBool::new(false)),
    };
    let fs: Arc<dyn FileSystem> = Arc::new(gated.clone());
    let handler: Arc<dyn JobHandler> = Arc::new(BulkCopyHandler::new(fs));
    let orch = build_orchestrator(cfg, vec![handler]);

    let params = json!({
        "sources": ["/src/f1", "/src/f2", "/src/f3", "/src/f4", "/src/f5"],
        "destination": "/dest",
    });
    let summary = orch.create(job_request("bulk_copy", params), None).await?;

    // Wait until the handler is pinned inside item 3 (two items tallied).
    for _ in 0..500 {
        let progress = orch.get(&summary.id, false, 0)?.record.progress;
        if progress.and_then(|p| p.completed) == Some(2) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    orch.action(&summary.id, TaskAction::Cancel, None).await?;
    gated.release();

    let detail = wait_terminal(&orch, &summary.id).await;
    assert_eq!(detail.record.status, TaskStatus::Cancelled);
    let report = detail.record.result.expect("partial report kept");
    let succeeded = report["succeeded"].as_u64().unwrap();
    let failed = report["failed"].as_u64().unwrap();
    // The handler processed at most 3 of 5 items before observing the flag.
    assert!(succeeded + failed <= 3);
    assert!(succeeded + failed < 5);
    Ok(())
}
