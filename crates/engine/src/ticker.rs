use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::trace;

/// Fire-and-forget delayed jobs where only the latest schedule counts.
///
/// Every `schedule` or `cancel` bumps a generation counter; a job that wakes up to find the counter
/// moved on does nothing.
#[derive(Debug, Clone, Default)]
pub struct Ticker {
    generation: Arc<AtomicU64>,
}

impl Ticker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule<F>(&self, delay: Duration, job: F) -> JoinHandle<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = Arc::clone(&self.generation);
        thread::spawn(move || {
            thread::sleep(delay);
            if generation.load(Ordering::SeqCst) == ticket {
                job();
            } else {
                trace!(ticket, "superseded tick skipped");
            }
        })
    }

    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}
