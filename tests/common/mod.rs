#![allow(dead_code)]

pub use taskwarden_test_utils::{builders, controllable, init_tracing};

use std::time::Duration;

use tempfile::TempDir;

use taskwarden::config::ConfigFile;
use taskwarden::orchestrator::Orchestrator;
use taskwarden::task::{TaskDetail, TaskStatus};

/// Config builder preloaded with a tempdir state directory, so tests never
/// touch the user's real cache.
pub fn temp_config_builder() -> (builders::ConfigFileBuilder, TempDir) {
    let dir = TempDir::new().expect("tempdir");
    let builder = builders::ConfigFileBuilder::new()
        .with_state_dir(dir.path().to_str().expect("utf-8 tempdir path"));
    (builder, dir)
}

/// Default test config in a tempdir.
pub fn temp_config() -> (ConfigFile, TempDir) {
    let (builder, dir) = temp_config_builder();
    (builder.build(), dir)
}

/// Poll `get` until the task reaches `status`, or panic after a bound so a
/// stuck task fails the test instead of hanging it.
pub async fn wait_for_status(orch: &Orchestrator, id: &str, status: TaskStatus) -> TaskDetail {
    for _ in 0..500 {
        let detail = orch.get(id, false, 0).expect("task should exist");
        if detail.record.status == status {
            return detail;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "task {id} did not reach {status:?} in time (last: {:?})",
        orch.get(id, false, 0).map(|d| d.record.status)
    );
}

/// Poll `get` until the task is terminal.
pub async fn wait_terminal(orch: &Orchestrator, id: &str) -> TaskDetail {
    for _ in 0..500 {
        let detail = orch.get(id, false, 0).expect("task should exist");
        if detail.record.status.is_terminal() {
            return detail;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {id} did not reach a terminal status in time");
}
