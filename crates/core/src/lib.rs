pub mod config;
pub mod constants;
pub mod error;
pub mod point;
pub mod strategy;

pub use config::Config;
pub use error::Error;
pub use point::{AnalysisPoint, LogFunc, PointCounter};
pub use strategy::LogStrategy;
