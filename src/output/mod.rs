//! Rendering of summaries and run results.

pub mod generator;

pub use generator::{generate_batch_summary, generate_json_snapshot, generate_markdown_summary};
