//! Aggregator: maintains a `(metric_name, sorted_label_string) →
//! PointCounter` map, shared by every ConsumerPool.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use log2metrics_core::{AnalysisPoint, PointCounter};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::info;

fn now_unix() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

/// Cumulative, never-reset aggregation state. Ingestion and the exporter's
/// export-time snapshot both serialize through the single `RwLock` — the
/// write side is always taken, since both mutate (ingestion) or need a
/// stable read of the whole map (export); there is no reader concurrency
/// to exploit at the scale this agent targets.
#[derive(Default)]
pub struct Aggregator {
    counters: RwLock<HashMap<String, PointCounter>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self { counters: RwLock::new(HashMap::new()) }
    }

    /// Apply one observation to its `(metric_name, sorted_label_string)`
    /// cell, creating it on first sight.
    pub async fn ingest(&self, point: AnalysisPoint) {
        let key = format!("{}{}", point.metric_name, point.sorted_label_string);
        let mut counters = self.counters.write().await;
        let counter = counters.entry(key).or_insert_with(|| {
            PointCounter::new(
                point.metric_name.clone(),
                point.log_func,
                point.sorted_label_string.clone(),
                point.label_map.clone(),
            )
        });
        counter.update(point.value, now_unix());
    }

    /// Drive ingestion from the consumer pools' shared point channel until
    /// cancelled.
    pub async fn run(&self, mut point_rx: mpsc::Receiver<AnalysisPoint>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("aggregator received cancellation, shutting down");
                    return;
                }
                point = point_rx.recv() => {
                    match point {
                        Some(p) => self.ingest(p).await,
                        None => return,
                    }
                }
            }
        }
    }

    /// Take the write lock and snapshot every counter's current state, for
    /// the Exporter's periodic projection.
    pub async fn snapshot(&self) -> Vec<PointCounter> {
        let counters = self.counters.write().await;
        counters.values().cloned().collect()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.counters.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log2metrics_core::LogFunc;
    use std::collections::BTreeMap;

    fn point(metric: &str, func: LogFunc, value: f64, labels: &[(&str, &str)]) -> AnalysisPoint {
        let label_map: BTreeMap<String, String> =
            labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let sorted = log2metrics_core::point::sorted_label_string(&label_map);
        AnalysisPoint {
            value,
            metric_name: metric.to_string(),
            log_func: func,
            sorted_label_string: sorted,
            label_map,
        }
    }

    #[tokio::test]
    async fn cnt_counts_five_arbitrary_lines() {
        let agg = Aggregator::new();
        for _ in 0..5 {
            agg.ingest(point("nginx_req_total", LogFunc::Cnt, f64::NAN, &[])).await;
        }
        let snap = agg.snapshot().await;
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].export_value(), 5.0);
    }

    #[tokio::test]
    async fn sum_with_label_splits_by_label_set() {
        let agg = Aggregator::new();
        agg.ingest(point("bytes_total", LogFunc::Sum, 10.0, &[("host", "a")])).await;
        agg.ingest(point("bytes_total", LogFunc::Sum, 20.0, &[("host", "a")])).await;
        agg.ingest(point("bytes_total", LogFunc::Sum, 5.0, &[("host", "b")])).await;

        let snap = agg.snapshot().await;
        let a = snap.iter().find(|pc| pc.label_map.get("host").map(String::as_str) == Some("a")).unwrap();
        let b = snap.iter().find(|pc| pc.label_map.get("host").map(String::as_str) == Some("b")).unwrap();
        assert_eq!(a.export_value(), 30.0);
        assert_eq!(b.export_value(), 5.0);
    }

    #[tokio::test]
    async fn max_and_min() {
        let agg_max = Aggregator::new();
        let agg_min = Aggregator::new();
        for v in [3.0, 7.0, 2.0, 9.0, 4.0] {
            agg_max.ingest(point("m", LogFunc::Max, v, &[])).await;
            agg_min.ingest(point("m", LogFunc::Min, v, &[])).await;
        }
        assert_eq!(agg_max.snapshot().await[0].export_value(), 9.0);
        assert_eq!(agg_min.snapshot().await[0].export_value(), 2.0);
    }

    #[tokio::test]
    async fn avg_over_values_and_with_no_observations() {
        let agg = Aggregator::new();
        for v in [2.0, 4.0, 6.0] {
            agg.ingest(point("m", LogFunc::Avg, v, &[])).await;
        }
        assert_eq!(agg.snapshot().await[0].export_value(), 4.0);

        let empty = Aggregator::new();
        assert_eq!(empty.snapshot().await.len(), 0);
    }

    #[tokio::test]
    async fn run_drains_channel_until_cancelled() {
        let agg = Aggregator::new();
        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        for i in 0..3 {
            tx.send(point("m", LogFunc::Sum, i as f64, &[])).await.unwrap();
        }
        let cancel2 = cancel.clone();
        let run = tokio::spawn(async move { agg.run(rx, cancel2).await });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel.cancel();
        run.await.unwrap();
    }
}
