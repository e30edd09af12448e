use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

/// Keeps successive write batches against the same table apart by at least
/// `delay`. The job is sequential, so waiting is a plain sleep.
#[derive(Debug)]
pub struct WritePacer {
    delay: Duration,
    last_batch: HashMap<String, Instant>,
}

impl WritePacer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_batch: HashMap::new(),
        }
    }

    /// Waits until a new batch may start against `table`.
    pub async fn wait_turn(&self, table: &str) {
        let Some(last) = self.last_batch.get(table) else {
            return;
        };
        let elapsed = last.elapsed();
        if elapsed < self.delay {
            let remaining = self.delay - elapsed;
            debug!(table, wait_ms = remaining.as_millis() as u64, "pacing write batch");
            tokio::time::sleep(remaining).await;
        }
    }

    /// Records that a batch against `table` just finished.
    pub fn batch_done(&mut self, table: &str) {
        self.last_batch.insert(table.to_string(), Instant::now());
    }
}
