use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use log2metrics_aggregate::Aggregator;
use log2metrics_core::constants::EXPORT_PERIOD;
use log2metrics_core::LogStrategy;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Projects [`Aggregator`] snapshots into `metrics` gauges on a fixed
/// period. Gauges are pre-described from the configured strategies so the
/// Prometheus HELP/TYPE lines exist even before the first sample lands.
///
/// A counter whose `metric_name` is not in the current registry (left over
/// from a strategy removed by a config reload) is skipped rather than
/// exported under a gauge nobody described, and logged exactly once.
pub struct Exporter {
    aggregator: Arc<Aggregator>,
    known_metrics: RwLock<HashSet<String>>,
    warned: StdMutex<HashSet<String>>,
}

impl Exporter {
    pub fn new(aggregator: Arc<Aggregator>, strategies: &[Arc<LogStrategy>]) -> Self {
        let known = describe_all(strategies);
        Self { aggregator, known_metrics: RwLock::new(known), warned: StdMutex::new(HashSet::new()) }
    }

    /// Re-describe the gauge registry from a new desired strategy set,
    /// after a config reload feeds a new set back through reconciliation.
    pub async fn update_registry(&self, strategies: &[Arc<LogStrategy>]) {
        let fresh = describe_all(strategies);
        *self.known_metrics.write().await = fresh;
    }

    /// One export pass: snapshot the aggregator and set every known gauge.
    pub async fn export_once(&self) {
        let known = self.known_metrics.read().await;
        for counter in self.aggregator.snapshot().await {
            if !known.contains(&counter.metric_name) {
                self.warn_unregistered_once(&counter.metric_name);
                continue;
            }
            let labels: Vec<(String, String)> =
                counter.label_map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            metrics::gauge!(counter.metric_name.clone(), &labels).set(counter.export_value());
        }
    }

    fn warn_unregistered_once(&self, metric_name: &str) {
        let mut warned = self.warned.lock().unwrap();
        if warned.insert(metric_name.to_string()) {
            warn!(metric = %metric_name, "skipping export of an unregistered metric");
        }
    }

    /// Run the periodic export loop until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(EXPORT_PERIOD);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = interval.tick() => self.export_once().await,
            }
        }
    }
}

fn describe_all(strategies: &[Arc<LogStrategy>]) -> HashSet<String> {
    let mut known = HashSet::with_capacity(strategies.len());
    for strategy in strategies {
        metrics::describe_gauge!(
            strategy.metric_name.clone(),
            metrics::Unit::Count,
            strategy.metric_help.clone()
        );
        known.insert(strategy.metric_name.clone());
    }
    known
}

#[cfg(test)]
mod tests {
    use super::*;
    use log2metrics_core::LogFunc;
    use std::collections::BTreeMap;

    fn strategy(metric_name: &str) -> Arc<LogStrategy> {
        let s = LogStrategy {
            id: 0,
            metric_name: metric_name.to_string(),
            metric_help: "a test metric".to_string(),
            file_path: "/x.log".to_string(),
            pattern: ".*".to_string(),
            func: LogFunc::Cnt,
            tags: BTreeMap::new(),
            creator: String::new(),
            pattern_re: None,
            tag_res: BTreeMap::new(),
        };
        Arc::new(s.compile().unwrap())
    }

    #[tokio::test]
    async fn export_once_skips_unregistered_metric_without_panicking() {
        let aggregator = Arc::new(Aggregator::new());
        aggregator
            .ingest(log2metrics_core::AnalysisPoint {
                value: 1.0,
                metric_name: "not_registered".to_string(),
                log_func: LogFunc::Cnt,
                sorted_label_string: String::new(),
                label_map: BTreeMap::new(),
            })
            .await;

        let exporter = Exporter::new(aggregator, &[strategy("other_metric")]);
        exporter.export_once().await;
    }

    #[tokio::test]
    async fn update_registry_picks_up_newly_added_strategy() {
        let aggregator = Arc::new(Aggregator::new());
        let exporter = Exporter::new(aggregator, &[]);
        assert!(exporter.known_metrics.read().await.is_empty());

        exporter.update_registry(&[strategy("fresh_metric")]).await;
        assert!(exporter.known_metrics.read().await.contains("fresh_metric"));
    }
}
