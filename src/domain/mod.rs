//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - fetched data (`Observation`, `RawSeries`)
//! - configuration tables (`WeightEntry`, `WeightsTable`, `PipelineConfig`)
//! - build outputs (`SeverityRow`, `SeverityTable`, `MetricsSnapshot`)

pub mod types;

pub use types::*;
