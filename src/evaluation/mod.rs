//! Prequential statistics, the retention window and verification views.

pub mod domain;
pub mod retention;
pub mod service;

pub use domain::{ConfusionMatrix, GenerationRecord, GlobalStats, Tally};
pub use retention::RetentionPolicy;
pub use service::Diagnostics;
