//! Windowed report statistics.
//!
//! `window` computes day and week boundaries, `aggregator` selects and reduces
//! reports, and `engine` ties both to the repository and the snapshot store.

pub mod aggregator;
pub mod engine;
pub mod window;

pub use engine::{AggregationEngine, AggregationRun};
