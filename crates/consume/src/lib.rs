//! Consumer pool: `CONSUMER_NUMBER` interchangeable workers parsing lines
//! from one Reader's line channel against a strategy's regexes.

mod analyze;
mod pool;

pub use analyze::analyze_line;
pub use pool::ConsumerPool;
