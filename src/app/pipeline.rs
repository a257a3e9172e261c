//! Pipeline stages shared by the CLI subcommands and the TUI.
//!
//! fetch -> (raw CSVs) -> clean + build -> (result table) -> emit
//!
//! Each stage either fully succeeds or returns an error before touching its
//! outputs. Stages communicate only through files on disk, so any stage can be
//! re-run on its own.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::NaiveDate;

use crate::data::SeriesSource;
use crate::domain::{MetricsSnapshot, PipelineConfig, RawSeries, SeverityTable, WeightsTable};
use crate::error::{BuildError, ConfigError, PipelineError};
use crate::index::{build_index, clean_series};
use crate::io::{load_weights, read_raw_series, read_table, stage_raw_series, validate_series_id, write_table};
use crate::logging::Reporter;
use crate::report::{ReportPaths, emit_report};

const BENCHMARK_CATEGORY: &str = "benchmark";

/// One series written by the fetch stage.
#[derive(Debug, Clone)]
pub struct FetchedSeries {
    pub series_id: String,
    pub observations: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub path: PathBuf,
    pub table: SeverityTable,
}

#[derive(Debug, Clone)]
pub struct EmitOutput {
    pub metrics_path: PathBuf,
    pub chart_path: PathBuf,
    pub table: SeverityTable,
    pub snapshot: MetricsSnapshot,
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub fetched: Vec<FetchedSeries>,
    pub build: BuildSummary,
    pub emit: EmitOutput,
}

/// Load the configured weights file and check the benchmark id.
pub fn load_validated_weights(config: &PipelineConfig, reporter: &dyn Reporter) -> Result<WeightsTable, ConfigError> {
    validate_series_id(&config.benchmark_id)?;
    load_weights(&config.config_dir, &config.weights_file, config.weight_tolerance, reporter)
}

/// Series to request: weighted ids in file order, then the benchmark unless it
/// is already weighted.
pub fn fetch_plan(weights: &WeightsTable, benchmark_id: &str) -> Vec<String> {
    let mut ids: Vec<String> = weights.series_ids().map(str::to_string).collect();
    if !ids.iter().any(|id| id == benchmark_id) {
        ids.push(benchmark_id.to_string());
    }
    ids
}

/// Fetch every planned series, then write them all.
///
/// Weights are validated before the first request. If any fetch fails, no raw
/// file is written or replaced.
pub fn fetch_stage(
    config: &PipelineConfig,
    source: &dyn SeriesSource,
    reporter: &dyn Reporter,
) -> Result<Vec<FetchedSeries>, PipelineError> {
    let weights = load_validated_weights(config, reporter)?;
    let plan = fetch_plan(&weights, &config.benchmark_id);
    reporter.info(&format!(
        "Fetching {} series for {}-{}",
        plan.len(),
        config.years.start,
        config.years.end
    ));

    let mut fetched: Vec<RawSeries> = Vec::with_capacity(plan.len());
    for series_id in &plan {
        let series = source.fetch_series(series_id, config.years, reporter)?;
        reporter.info(&format!("Fetched {series_id}: {} observations", series.len()));
        fetched.push(series);
    }

    // Every file is written out before any of them replaces the stored copy.
    let raw_dir = config.raw_dir();
    let staged = fetched
        .iter()
        .map(|series| stage_raw_series(&raw_dir, series))
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(fetched.len());
    for (series, file) in fetched.iter().zip(staged) {
        let path = file.commit()?;
        reporter.debug(&format!("Wrote {}", path.display()));
        out.push(FetchedSeries {
            series_id: series.series_id.clone(),
            observations: series.len(),
            first_date: series.first_date(),
            last_date: series.last_date(),
            path,
        });
    }
    Ok(out)
}

/// Read raw series, clean them, build the index, and write the result table.
pub fn build_stage(config: &PipelineConfig, reporter: &dyn Reporter) -> Result<BuildSummary, PipelineError> {
    let weights = load_validated_weights(config, reporter)?;

    let mut components: HashMap<String, RawSeries> = HashMap::with_capacity(weights.entries.len());
    for entry in &weights.entries {
        let series = load_raw(config, &entry.category, &entry.series_id, reporter)?;
        components.insert(entry.series_id.clone(), series);
    }
    let benchmark = match components.get(&config.benchmark_id) {
        Some(series) => series.clone(),
        None => load_raw(config, BENCHMARK_CATEGORY, &config.benchmark_id, reporter)?,
    };

    let table = build_index(&weights, &components, &benchmark, &config.build)?;
    if let (Some(first), Some(last)) = (table.rows.first(), table.rows.last()) {
        reporter.info(&format!("Built {} rows from {} to {}", table.rows.len(), first.date, last.date));
    }

    let path = config.table_path();
    write_table(&path, &table).map_err(BuildError::from)?;
    reporter.info(&format!("Wrote {}", path.display()));
    Ok(BuildSummary { path, table })
}

/// Read the result table and write the metrics snapshot and chart.
pub fn emit_stage(
    config: &PipelineConfig,
    generated_at: &str,
    reporter: &dyn Reporter,
) -> Result<EmitOutput, PipelineError> {
    let table_path = config.table_path();
    let table = read_table(&table_path)?;

    let metrics_path = config.metrics_path();
    let chart_path = config.chart_path();
    let paths = ReportPaths {
        table: &table_path,
        metrics: &metrics_path,
        chart: &chart_path,
    };
    let snapshot = emit_report(paths, &table, &config.benchmark_id, generated_at)?;
    reporter.info(&format!("Wrote {}", chart_path.display()));
    reporter.info(&format!("Wrote {}", metrics_path.display()));

    Ok(EmitOutput {
        metrics_path,
        chart_path,
        table,
        snapshot,
    })
}

/// fetch, build, and emit in order, stopping at the first failure.
pub fn run_all(
    config: &PipelineConfig,
    source: &dyn SeriesSource,
    generated_at: &str,
    reporter: &dyn Reporter,
) -> Result<RunOutput, PipelineError> {
    let fetched = fetch_stage(config, source, reporter)?;
    let build = build_stage(config, reporter)?;
    let emit = emit_stage(config, generated_at, reporter)?;
    Ok(RunOutput { fetched, build, emit })
}

fn load_raw(
    config: &PipelineConfig,
    category: &str,
    series_id: &str,
    reporter: &dyn Reporter,
) -> Result<RawSeries, BuildError> {
    let path = config.raw_series_path(series_id);
    if !path.is_file() {
        return Err(BuildError::MissingSeries {
            category: category.to_string(),
            series_id: series_id.to_string(),
            path: Some(path),
        });
    }
    let series = read_raw_series(&path, series_id)?;
    reporter.debug(&format!("Read {} ({} observations)", path.display(), series.len()));
    Ok(clean_series(series, reporter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WeightEntry;

    fn weights(ids: &[&str]) -> WeightsTable {
        WeightsTable {
            source: PathBuf::from("weights.csv"),
            entries: ids
                .iter()
                .map(|id| WeightEntry {
                    category: format!("cat-{id}"),
                    series_id: id.to_string(),
                    weight: 1.0 / ids.len() as f64,
                })
                .collect(),
        }
    }

    #[test]
    fn fetch_plan_appends_benchmark_once() {
        assert_eq!(fetch_plan(&weights(&["A", "B"]), "BM"), vec!["A", "B", "BM"]);
        assert_eq!(fetch_plan(&weights(&["A", "BM"]), "BM"), vec!["A", "BM"]);
    }
}
