//! `severity-cpi` library crate.
//!
//! The binary (`sev`) is a thin wrapper around this library so that:
//!
//! - every pipeline stage is testable without spawning processes
//! - the fetch source is swappable (`data::SeriesSource`) for offline tests
//! - the TUI and the CLI share one pipeline

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod index;
pub mod io;
pub mod logging;
pub mod report;
pub mod tui;
