//! Upstream data sources.

pub mod bls;
pub mod retry;

pub use bls::{BlsClient, SeriesSource};
pub use retry::RetryPolicy;
