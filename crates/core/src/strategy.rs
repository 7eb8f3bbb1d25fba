//! `LogStrategy`: a user's declaration of how to turn lines from one file
//! into one metric.

use std::collections::BTreeMap;

use md5::{Digest, Md5};
use regex::Regex;
use serde::Deserialize;

use crate::error::Error;
use crate::point::LogFunc;

/// Configured, immutable-after-load strategy for one metric.
///
/// Deserialized directly from the `log_strategies` list in the YAML config
/// file. `pattern_re`/`tag_res` are derived at load time via
/// [`LogStrategy::compile`] and are never part of the YAML document.
#[derive(Debug, Clone, Deserialize)]
pub struct LogStrategy {
    #[serde(default)]
    pub id: i64,
    pub metric_name: String,
    #[serde(default)]
    pub metric_help: String,
    pub file_path: String,
    pub pattern: String,
    pub func: LogFunc,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub creator: String,

    #[serde(skip)]
    pub pattern_re: Option<Regex>,
    #[serde(skip)]
    pub tag_res: BTreeMap<String, Regex>,
}

impl LogStrategy {
    /// Compile `pattern` and every `tags` regex. A bad main regex is a
    /// configuration error (fails the whole load); a bad tag regex is
    /// logged and that tag is skipped, the strategy otherwise continues.
    pub fn compile(mut self) -> Result<Self, Error> {
        let re = Regex::new(&self.pattern).map_err(|source| Error::InvalidRegex {
            pattern: self.pattern.clone(),
            source,
        })?;
        self.pattern_re = Some(re);

        let mut tag_res = BTreeMap::new();
        for (name, pattern) in &self.tags {
            match Regex::new(pattern) {
                Ok(re) => {
                    tag_res.insert(name.clone(), re);
                }
                Err(e) => {
                    tracing::warn!(
                        tag = %name, pattern = %pattern, error = %e,
                        "skipping tag with invalid regex"
                    );
                }
            }
        }
        self.tag_res = tag_res;
        Ok(self)
    }

    /// `md5(file_path ‖ metric_name)` rendered as lowercase hex — the
    /// identity a `LogJob` reconciles on.
    pub fn job_hash(&self) -> String {
        let mut hasher = Md5::new();
        hasher.update(self.file_path.as_bytes());
        hasher.update(self.metric_name.as_bytes());
        hex::encode(hasher.finalize())
    }
}
