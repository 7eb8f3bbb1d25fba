use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log2metrics_core::{AnalysisPoint, LogStrategy};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::job::LogJob;

/// Owns the active `hash → LogJob` table and reconciles it against whatever
/// set of strategies the config layer hands it.
pub struct JobManager {
    active: Mutex<HashMap<String, Arc<LogJob>>>,
    point_tx: mpsc::Sender<AnalysisPoint>,
}

impl JobManager {
    pub fn new(point_tx: mpsc::Sender<AnalysisPoint>) -> Self {
        Self { active: Mutex::new(HashMap::new()), point_tx }
    }

    #[cfg(test)]
    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap().len()
    }

    /// Reconcile `desired` against the active table: new strategies get a
    /// `LogJob` inserted and started, strategies no longer present get
    /// signalled to stop and removed. The lock covers the diff and the
    /// insert/remove bookkeeping only — `start()` always runs after it is
    /// released, since opening files and spawning workers is slow and must
    /// not serialize reconciliation passes against each other.
    pub async fn sync(&self, desired: Vec<Arc<LogStrategy>>) {
        let desired: HashMap<String, Arc<LogStrategy>> =
            desired.into_iter().map(|s| (s.job_hash(), s)).collect();

        let mut to_start = Vec::new();
        {
            let mut active = self.active.lock().unwrap();

            let stale: Vec<String> =
                active.keys().filter(|hash| !desired.contains_key(*hash)).cloned().collect();
            for hash in stale {
                if let Some(job) = active.remove(&hash) {
                    info!(hash = %hash, "stopping job no longer in configuration");
                    job.signal_stop();
                }
            }

            for (hash, strategy) in desired {
                if !active.contains_key(&hash) {
                    let job = LogJob::new(strategy);
                    active.insert(hash, job.clone());
                    to_start.push(job);
                }
            }
        }

        for job in to_start {
            info!(hash = %job.hash(), metric = %job.strategy().metric_name, "starting new job");
            job.start(self.point_tx.clone()).await;
        }
    }

    /// Signal every active job to stop, then wait for each to fully exit.
    /// Only used on agent shutdown, where blocking is acceptable.
    pub async fn stop_all(&self) {
        let jobs: Vec<Arc<LogJob>> = {
            let mut active = self.active.lock().unwrap();
            active.drain().map(|(_, job)| job).collect()
        };
        for job in &jobs {
            job.signal_stop();
        }
        for job in jobs {
            job.join().await;
        }
    }

    /// Drive reconciliation from a channel of desired-state snapshots until
    /// cancelled, then stop every active job.
    pub async fn run(
        &self,
        mut desired_rx: mpsc::Receiver<Vec<Arc<LogStrategy>>>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.stop_all().await;
                    return;
                }
                desired = desired_rx.recv() => {
                    match desired {
                        Some(d) => self.sync(d).await,
                        None => {
                            self.stop_all().await;
                            return;
                        }
                    }
                }
            }
        }
    }
}
