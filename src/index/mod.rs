//! Composite index construction.

pub mod builder;
pub mod clean;

pub use builder::*;
pub use clean::*;
