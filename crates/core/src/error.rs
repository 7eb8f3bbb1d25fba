use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid regex {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("duplicate metric_name {0:?} across log_strategies")]
    DuplicateMetricName(String),

    #[error("open failed for {path}: {cause}")]
    OpenFailure { path: String, cause: String },

    #[error("{0}")]
    Other(String),
}
