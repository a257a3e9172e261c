//! Command-line parsing for the severity index pipeline.
//!
//! Argument parsing and command dispatch stay separate from the pipeline code;
//! `app` turns these structs into a [`PipelineConfig`].

use std::path::PathBuf;
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use clap::{Args, Parser, Subcommand};

use crate::data::RetryPolicy;
use crate::domain::{
    BuildOptions, PipelineConfig, YearRange, DEFAULT_BENCHMARK, DEFAULT_START_YEAR, DEFAULT_WEIGHT_TOLERANCE,
    DEFAULT_WEIGHTS_FILE,
};
use crate::error::ConfigError;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "sev", version, about = "P&C claims severity index from BLS CPI components")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download every weighted series plus the benchmark into the raw data directory.
    Fetch(FetchArgs),
    /// Build the composite index table from raw series.
    Build(BuildArgs),
    /// Write the metrics snapshot and chart from the result table.
    Emit(EmitArgs),
    /// fetch, build, and emit in order.
    Run(RunArgs),
    /// Browse the result table in a terminal UI.
    View,
}

/// Locations and inputs shared by every subcommand.
#[derive(Debug, Args, Clone)]
pub struct GlobalArgs {
    /// Root of raw and processed data.
    #[arg(long, global = true, env = "SEV_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Directory holding the weights file. Weights paths may not leave it.
    #[arg(long, global = true, env = "SEV_CONFIG_DIR", default_value = "config")]
    pub config_dir: PathBuf,

    /// Output directory for the metrics snapshot and chart.
    #[arg(long, global = true, env = "SEV_ASSETS_DIR", default_value = "assets")]
    pub assets_dir: PathBuf,

    /// Weights file name, relative to the config directory.
    #[arg(long, global = true, default_value = DEFAULT_WEIGHTS_FILE)]
    pub weights: String,

    /// Benchmark series id.
    #[arg(long, global = true, env = "SEV_BENCHMARK", default_value = DEFAULT_BENCHMARK)]
    pub benchmark: String,

    /// Default log filter when RUST_LOG is unset (e.g. info, debug, sev=debug).
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Args, Clone)]
pub struct FetchArgs {
    /// First year to request.
    #[arg(long, default_value_t = DEFAULT_START_YEAR)]
    pub start_year: i32,

    /// Last year to request (default: current year).
    #[arg(long)]
    pub end_year: Option<i32>,

    /// Extra attempts after a transport failure.
    #[arg(long, default_value_t = 0)]
    pub retries: u32,

    /// Base delay between attempts, in seconds.
    #[arg(long, default_value_t = 5)]
    pub retry_delay_secs: u64,
}

#[derive(Debug, Args, Clone)]
pub struct BuildArgs {
    /// Rebase every series to 100 at this month (YYYY-MM or YYYY-MM-01).
    #[arg(long, value_parser = parse_month, default_value = "2010-01")]
    pub base_date: NaiveDate,

    /// Keep published index levels instead of rebasing.
    #[arg(long)]
    pub no_rebase: bool,

    /// Allowed distance of the weight sum from 1.0.
    #[arg(long, default_value_t = DEFAULT_WEIGHT_TOLERANCE)]
    pub tolerance: f64,
}

#[derive(Debug, Args, Clone)]
pub struct EmitArgs {
    /// Recent months to print after emitting.
    #[arg(long, default_value_t = 12)]
    pub recent: usize,
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub fetch: FetchArgs,

    #[command(flatten)]
    pub build: BuildArgs,

    #[command(flatten)]
    pub emit: EmitArgs,
}

/// Parse a monthly date. Observations are keyed on the first of the month.
pub fn parse_month(s: &str) -> Result<NaiveDate, String> {
    let s = s.trim();
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d"))
        .map_err(|_| format!("expected YYYY-MM or YYYY-MM-DD, got '{s}'"))?;
    if date.day() != 1 {
        return Err(format!("'{s}' is not the first day of a month"));
    }
    Ok(date)
}

/// Assemble the pipeline configuration. Stage-specific options that the
/// subcommand does not take keep their defaults.
pub fn pipeline_config(
    global: &GlobalArgs,
    fetch: Option<&FetchArgs>,
    build: Option<&BuildArgs>,
    current_year: i32,
) -> Result<PipelineConfig, ConfigError> {
    let mut years = YearRange::new(DEFAULT_START_YEAR, current_year.max(DEFAULT_START_YEAR))?;
    let mut retry = RetryPolicy::none();
    if let Some(args) = fetch {
        years = YearRange::new(args.start_year, args.end_year.unwrap_or(current_year))?;
        retry = RetryPolicy::new(args.retries, Duration::from_secs(args.retry_delay_secs));
    }

    let mut options = BuildOptions {
        base_date: NaiveDate::from_ymd_opt(DEFAULT_START_YEAR, 1, 1),
    };
    let mut tolerance = DEFAULT_WEIGHT_TOLERANCE;
    if let Some(args) = build {
        options.base_date = (!args.no_rebase).then_some(args.base_date);
        tolerance = args.tolerance;
    }
    if !(tolerance.is_finite() && tolerance >= 0.0) {
        return Err(ConfigError::InvalidTolerance(tolerance));
    }

    Ok(PipelineConfig {
        data_dir: global.data_dir.clone(),
        config_dir: global.config_dir.clone(),
        assets_dir: global.assets_dir.clone(),
        weights_file: global.weights.clone(),
        benchmark_id: global.benchmark.trim().to_string(),
        years,
        build: options,
        weight_tolerance: tolerance,
        retry,
    })
}
