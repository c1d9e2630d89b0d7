//! Report classification.
//!
//! The classifier maps categories to responsible areas; the pipeline applies
//! it to pending reports and dispatches notifications.

pub mod classifier;
pub mod pipeline;

pub use classifier::{default_areas, AreaMapping, Classifier};
pub use pipeline::{BatchReport, ClassificationPipeline};
