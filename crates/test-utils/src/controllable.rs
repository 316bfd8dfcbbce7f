use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use taskwarden::job::{JobContext, JobHandler, JobOutcome};

/// A job handler the test controls: every run blocks until [`release_all`]
/// is called (or the job is cancelled), while the test observes how many
/// runs have started and finished.
///
/// This is the job-side analogue of a fake process executor: it lets tests
/// pin jobs in the `running` state to exercise concurrency caps, queueing
/// and cancellation deterministically.
///
/// [`release_all`]: ControllableHandler::release_all
#[derive(Debug, Default)]
pub struct ControllableHandler {
    started: AtomicUsize,
    finished: AtomicUsize,
    released: AtomicBool,
}

impl ControllableHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Upcast for handler registration.
    pub fn as_handler(self: &Arc<Self>) -> Arc<dyn JobHandler> {
        self.clone()
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    /// Let every current and future run complete.
    pub fn release_all(&self) {
        self.released.store(true, Ordering::SeqCst);
    }

    /// Wait until at least `n` runs have started, or panic after a few
    /// seconds so a broken dispatcher fails the test instead of hanging it.
    pub async fn wait_for_started(&self, n: usize) {
        for _ in 0..500 {
            if self.started() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {n} runs to start, saw {}", self.started());
    }
}

impl JobHandler for ControllableHandler {
    fn job_type(&self) -> &str {
        "controllable"
    }

    fn run(&self, ctx: &JobContext, _params: serde_json::Value) -> JobOutcome {
        self.started.fetch_add(1, Ordering::SeqCst);
        loop {
            if self.released.load(Ordering::SeqCst) {
                break;
            }
            if ctx.is_cancelled() {
                return JobOutcome::Cancelled {
                    result: None,
                    message: None,
                };
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        self.finished.fetch_add(1, Ordering::SeqCst);
        JobOutcome::Completed {
            result: None,
            message: None,
        }
    }
}
