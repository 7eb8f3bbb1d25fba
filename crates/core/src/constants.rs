//! Compile-time constants visible at the system boundary.

use std::time::Duration;

/// Capacity of the reader → consumer line channel. Reached, lines are dropped.
pub const LOG_QUEUE_SIZE: usize = 1024;

/// Capacity of the consumer → aggregator point channel.
pub const COUNTER_QUEUE_SIZE: usize = 1024;

/// Number of consumer workers spawned per tailed file.
pub const CONSUMER_NUMBER: usize = 10;

/// Period on which the Exporter materializes counters into gauge samples.
pub const EXPORT_PERIOD: Duration = Duration::from_secs(10);

/// Period on which the Tail Reader and Consumer Pool log throughput stats.
pub const STATS_PERIOD: Duration = Duration::from_secs(10);

/// Poll interval used by the Tail Reader to check for file growth/rotation.
pub const TAIL_POLL_INTERVAL: Duration = Duration::from_millis(250);
