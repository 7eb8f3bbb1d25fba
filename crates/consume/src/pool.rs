use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use log2metrics_core::constants::CONSUMER_NUMBER;
use log2metrics_core::{AnalysisPoint, LogStrategy};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::analyze::analyze_line;

/// A pool of `CONSUMER_NUMBER` interchangeable workers, all reading from the
/// same bounded line channel and all producing into the same point channel.
/// No per-worker affinity; any worker can process any line.
pub struct ConsumerPool {
    strategy: Arc<LogStrategy>,
    line_rx: Arc<Mutex<mpsc::Receiver<String>>>,
    point_tx: mpsc::Sender<AnalysisPoint>,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ConsumerPool {
    pub fn new(
        strategy: Arc<LogStrategy>,
        line_rx: mpsc::Receiver<String>,
        point_tx: mpsc::Sender<AnalysisPoint>,
    ) -> Self {
        Self {
            strategy,
            line_rx: Arc::new(Mutex::new(line_rx)),
            point_tx,
            cancel: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Launch `CONSUMER_NUMBER` workers.
    pub async fn start(self: &Arc<Self>) {
        let mut workers = self.workers.lock().await;
        for worker_id in 0..CONSUMER_NUMBER {
            workers.push(tokio::spawn(Self::run_worker(self.clone(), worker_id)));
        }
    }

    /// Signal every worker to exit, without waiting. Non-blocking: safe to
    /// call from inside another lock's critical section.
    pub fn signal_stop(&self) {
        self.cancel.cancel();
    }

    /// Signal every worker to exit and wait until each has acknowledged.
    /// No line left in the channel beyond what workers already took is
    /// processed further.
    pub async fn stop(&self) {
        self.signal_stop();
        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            let _ = handle.await;
        }
    }

    async fn run_worker(pool: Arc<Self>, worker_id: usize) {
        loop {
            let line = {
                let mut rx = pool.line_rx.lock().await;
                tokio::select! {
                    biased;
                    _ = pool.cancel.cancelled() => return,
                    line = rx.recv() => line,
                }
            };
            let Some(line) = line else { return };

            match std::panic::catch_unwind(AssertUnwindSafe(|| analyze_line(&line, &pool.strategy))) {
                Ok(Some(point)) => {
                    if pool.point_tx.send(point).await.is_err() {
                        // Aggregator is gone; nothing left to do but stop.
                        return;
                    }
                }
                Ok(None) => {}
                Err(panic) => {
                    warn!(
                        worker_id,
                        metric = %pool.strategy.metric_name,
                        panic = ?panic.downcast_ref::<&str>(),
                        "consumer worker recovered from panic while analyzing a line",
                    );
                }
            }
        }
    }
}
