//! Tail reader: follows one file through rotation, emitting lines into a
//! bounded channel and dropping under backpressure.

mod reader;

pub use reader::{TailReader, TailStats};
