use std::sync::Arc;

use log2metrics_consume::ConsumerPool;
use log2metrics_core::constants::LOG_QUEUE_SIZE;
use log2metrics_core::{AnalysisPoint, LogStrategy};
use log2metrics_tail::TailReader;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

/// A running tail reader plus its consumer pool. Absent until `start()`
/// has successfully opened the file.
struct Running {
    reader: Arc<TailReader>,
    pool: Arc<ConsumerPool>,
}

/// One strategy's file-to-metric pipeline. Identity is `strategy.job_hash()`;
/// the Job Manager keys its active table on it.
///
/// `start()` is slow (it opens the file and spawns workers) and must never
/// run while the Job Manager's active-table lock is held. `signal_stop()` is
/// the opposite: non-blocking, safe to call under that lock, and is what
/// lets the reconciliation's stop/insert step stay synchronous.
pub struct LogJob {
    hash: String,
    strategy: Arc<LogStrategy>,
    running: Mutex<Option<Running>>,
}

impl LogJob {
    pub fn new(strategy: Arc<LogStrategy>) -> Arc<Self> {
        let hash = strategy.job_hash();
        Arc::new(Self { hash, strategy, running: Mutex::new(None) })
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn strategy(&self) -> &Arc<LogStrategy> {
        &self.strategy
    }

    /// Open the tail reader and spawn the consumer pool. Logs and returns
    /// without starting anything if the file does not exist yet — the next
    /// reconciliation pass will retry since the strategy stays in `desired`.
    pub async fn start(&self, point_tx: mpsc::Sender<AnalysisPoint>) {
        let (line_tx, line_rx) = mpsc::channel(LOG_QUEUE_SIZE);
        let reader = match TailReader::open(&self.strategy.file_path, line_tx) {
            Ok(r) => Arc::new(r),
            Err(e) => {
                warn!(
                    file_path = %self.strategy.file_path,
                    metric = %self.strategy.metric_name,
                    error = %e,
                    "failed to open tail reader; job left unstarted",
                );
                return;
            }
        };
        reader.start_tracked().await;

        let pool = Arc::new(ConsumerPool::new(self.strategy.clone(), line_rx, point_tx));
        pool.start().await;

        *self.running.lock().await = Some(Running { reader, pool });
    }

    /// Signal the reader and pool to stop. Never awaits a join, so it is
    /// safe to call while holding the Job Manager's active-table lock.
    pub fn signal_stop(&self) {
        match self.running.try_lock() {
            Ok(guard) => {
                if let Some(running) = guard.as_ref() {
                    running.reader.stop();
                    running.pool.signal_stop();
                }
            }
            Err(_) => {
                // A start() is in flight; nothing to signal yet. The job is
                // about to be dropped from the active table regardless, so
                // its workers simply run until their own idle logic ends —
                // acceptable since this only races with a job that was both
                // added and removed within the same reconciliation window.
                warn!(hash = %self.hash, "signal_stop raced with an in-flight start");
            }
        }
    }

    /// Wait for a previously-signalled job to fully exit. Only meaningful
    /// after `signal_stop()`; used during full shutdown, where blocking
    /// under the lock is acceptable.
    pub async fn join(&self) {
        let running = self.running.lock().await.take();
        if let Some(running) = running {
            running.reader.join().await;
            running.pool.stop().await;
        }
    }
}
