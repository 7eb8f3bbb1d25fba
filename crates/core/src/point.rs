//! The analysis/aggregation value types shared between the consumer pool,
//! the aggregator, and the exporter.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Aggregation function a [`crate::LogStrategy`] applies to matched values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFunc {
    Cnt,
    Sum,
    Max,
    Min,
    Avg,
}

impl fmt::Display for LogFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogFunc::Cnt => "cnt",
            LogFunc::Sum => "sum",
            LogFunc::Max => "max",
            LogFunc::Min => "min",
            LogFunc::Avg => "avg",
        };
        f.write_str(s)
    }
}

/// One parsed observation, emitted by a Consumer and consumed by the Aggregator.
/// Transient: never persisted.
#[derive(Debug, Clone)]
pub struct AnalysisPoint {
    pub value: f64,
    pub metric_name: String,
    pub log_func: LogFunc,
    pub sorted_label_string: String,
    pub label_map: BTreeMap<String, String>,
}

/// Deterministically encode a label map as `"k1=v1,k2=v2,..."`, sorted by key.
/// Empty maps encode to the empty string; this is stable under re-ordered
/// insertion since the map itself is already key-sorted (`BTreeMap`).
pub fn sorted_label_string(label_map: &BTreeMap<String, String>) -> String {
    label_map
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// An aggregation cell: one per distinct `(metric_name, sorted_label_string)`.
#[derive(Debug, Clone)]
pub struct PointCounter {
    pub metric_name: String,
    pub log_func: LogFunc,
    pub sorted_label_string: String,
    pub label_map: BTreeMap<String, String>,

    pub count: i64,
    pub sum: f64,
    pub max: f64,
    pub min: f64,
    pub last_update_unix: i64,
}

impl PointCounter {
    pub fn new(
        metric_name: String,
        log_func: LogFunc,
        sorted_label_string: String,
        label_map: BTreeMap<String, String>,
    ) -> Self {
        Self {
            metric_name,
            log_func,
            sorted_label_string,
            label_map,
            count: 0,
            sum: 0.0,
            max: f64::NAN,
            min: f64::NAN,
            last_update_unix: 0,
        }
    }

    /// Apply one observation. NaN values still increment `count` (so `cnt`
    /// works alongside `sum`/`max`/`min` on the same strategy) but never
    /// corrupt the numeric aggregates.
    pub fn update(&mut self, value: f64, now_unix: i64) {
        if value.is_finite() {
            self.sum += value;
            self.max = if self.max.is_nan() { value } else { self.max.max(value) };
            self.min = if self.min.is_nan() { value } else { self.min.min(value) };
        }
        self.count += 1;
        self.last_update_unix = now_unix;
    }

    /// Project this counter's current state into the scalar the strategy's
    /// `func` exports.
    pub fn export_value(&self) -> f64 {
        match self.log_func {
            LogFunc::Cnt => self.count as f64,
            LogFunc::Sum => self.sum,
            LogFunc::Max => self.max,
            LogFunc::Min => self.min,
            LogFunc::Avg => {
                if self.count > 0 {
                    self.sum / self.count as f64
                } else {
                    0.0
                }
            }
        }
    }
}
