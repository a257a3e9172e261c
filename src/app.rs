//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and installs logging
//! - builds the pipeline configuration
//! - runs the requested stage(s) and prints summaries

use chrono::{Datelike, SecondsFormat, Utc};
use clap::Parser;

use crate::cli::{Cli, Command, EmitArgs, GlobalArgs, pipeline_config};
use crate::data::BlsClient;
use crate::domain::PipelineConfig;
use crate::error::AppError;
use crate::logging::{TracingReporter, init_tracing};
use crate::report::format::{format_latest_summary, format_recent_rows};

pub mod pipeline;

/// Entry point for the `sev` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    init_tracing(&cli.global.log_level)?;

    let year = Utc::now().year();
    match &cli.command {
        Command::Fetch(args) => {
            let config = pipeline_config(&cli.global, Some(args), None, year)?;
            handle_fetch(&config)
        }
        Command::Build(args) => {
            let config = pipeline_config(&cli.global, None, Some(args), year)?;
            handle_build(&config)
        }
        Command::Emit(args) => {
            let config = pipeline_config(&cli.global, None, None, year)?;
            handle_emit(&config, args)
        }
        Command::Run(args) => {
            let config = pipeline_config(&cli.global, Some(&args.fetch), Some(&args.build), year)?;
            handle_run(&config, &args.emit)
        }
        Command::View => handle_view(&cli.global, year),
    }
}

fn handle_fetch(config: &PipelineConfig) -> Result<(), AppError> {
    let client = BlsClient::from_env(config.retry)?;
    let fetched = pipeline::fetch_stage(config, &client, &TracingReporter::new("fetch"))?;
    for s in &fetched {
        println!(
            "{:<16} {:>5} obs  {} .. {}  -> {}",
            s.series_id,
            s.observations,
            fmt_month(s.first_date),
            fmt_month(s.last_date),
            s.path.display()
        );
    }
    Ok(())
}

fn handle_build(config: &PipelineConfig) -> Result<(), AppError> {
    let summary = pipeline::build_stage(config, &TracingReporter::new("build"))?;
    println!("Wrote {} rows to {}", summary.table.rows.len(), summary.path.display());
    Ok(())
}

fn handle_emit(config: &PipelineConfig, args: &EmitArgs) -> Result<(), AppError> {
    let out = pipeline::emit_stage(config, &generated_at(), &TracingReporter::new("emit"))?;
    print_emit(config, &out, args);
    Ok(())
}

fn handle_run(config: &PipelineConfig, args: &EmitArgs) -> Result<(), AppError> {
    let client = BlsClient::from_env(config.retry)?;
    let out = pipeline::run_all(config, &client, &generated_at(), &TracingReporter::new("run"))?;
    print_emit(config, &out.emit, args);
    Ok(())
}

fn handle_view(global: &GlobalArgs, year: i32) -> Result<(), AppError> {
    let config = pipeline_config(global, None, None, year)?;
    crate::tui::run(&config)
}

fn print_emit(config: &PipelineConfig, out: &pipeline::EmitOutput, args: &EmitArgs) {
    println!("{}", format_latest_summary(&out.snapshot, &config.benchmark_id));
    if args.recent > 0 {
        println!("{}", format_recent_rows(&out.table, args.recent));
    }
    println!("Metrics: {}", out.metrics_path.display());
    println!("Chart  : {}", out.chart_path.display());
}

fn generated_at() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn fmt_month(date: Option<chrono::NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m").to_string())
        .unwrap_or_else(|| "-".to_string())
}
