//! Top-level YAML configuration, loaded once at startup.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::Error;
use crate::strategy::LogStrategy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc_server_addr: String,
    pub log_strategies: Vec<LogStrategy>,
    #[serde(default = "default_http_addr")]
    pub http_addr: String,
    #[serde(default)]
    pub log_collecting: LogCollectingConfig,
    #[serde(default)]
    pub local_config: LocalConfig,
}

fn default_http_addr() -> String {
    ":8080".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogCollectingConfig {
    #[serde(default = "default_true")]
    pub enable: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LogCollectingConfig {
    fn default() -> Self {
        Self { enable: true }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocalConfig {
    #[serde(default)]
    pub nginx_log_generating: bool,
    #[serde(default)]
    pub rate_per_second: u32,
}

impl Config {
    /// Parse a YAML document, compile every strategy's regexes, and reject
    /// duplicate `metric_name`s, since the aggregator and exporter both key
    /// on it.
    pub fn load(yaml: &str) -> Result<Self, Error> {
        let mut cfg: Config = serde_yaml::from_str(yaml)?;

        let mut compiled = Vec::with_capacity(cfg.log_strategies.len());
        for strategy in cfg.log_strategies.drain(..) {
            compiled.push(strategy.compile()?);
        }
        cfg.log_strategies = compiled;

        let mut seen = HashSet::with_capacity(cfg.log_strategies.len());
        for s in &cfg.log_strategies {
            if !seen.insert(s.metric_name.clone()) {
                return Err(Error::DuplicateMetricName(s.metric_name.clone()));
            }
        }

        Ok(cfg)
    }

    /// Read the file at `path` and parse it as a [`Config`].
    pub fn load_file(path: &Path) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        Self::load(&contents)
    }
}
