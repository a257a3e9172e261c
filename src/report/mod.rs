//! Report emitter: metrics snapshot, chart, and terminal output.
//!
//! Everything here reads the result table written by the build stage; it never
//! recomputes the index.

use std::io::Write;
use std::path::Path;

use crate::domain::{MetricsSnapshot, SeverityTable};
use crate::error::{ReportError, WriteError};
use crate::io::atomic::{StagedFile, stage_atomic};

pub mod chart;
pub mod format;

/// Summarize the most recent row for downstream pages.
///
/// Levels and gap are rounded to one decimal; YoY values are converted to
/// percent and rounded to one decimal.
pub fn metrics_snapshot(table: &SeverityTable, generated_at: &str) -> Option<MetricsSnapshot> {
    let latest = table.latest()?;
    Some(MetricsSnapshot {
        composite_value: round1(latest.composite_value),
        yoy_change: latest.yoy_change.map(|v| round1(v * 100.0)),
        benchmark_value: round1(latest.benchmark_value),
        benchmark_yoy_change: latest.benchmark_yoy_change.map(|v| round1(v * 100.0)),
        gap: round1(latest.gap),
        last_updated_date: latest.date,
        generated_at: generated_at.to_string(),
    })
}

pub fn stage_metrics_json(path: &Path, snapshot: &MetricsSnapshot) -> Result<StagedFile, WriteError> {
    stage_atomic(path, |w| {
        serde_json::to_writer_pretty(&mut *w, snapshot)?;
        writeln!(w)
    })
}

/// Where the emitted artifacts go.
#[derive(Debug, Clone, Copy)]
pub struct ReportPaths<'a> {
    pub table: &'a Path,
    pub metrics: &'a Path,
    pub chart: &'a Path,
}

/// Build the snapshot and the chart for `table` and write both.
///
/// Nothing is replaced until both artifacts were rendered and written out.
pub fn emit_report(
    paths: ReportPaths<'_>,
    table: &SeverityTable,
    benchmark_label: &str,
    generated_at: &str,
) -> Result<MetricsSnapshot, ReportError> {
    let snapshot = metrics_snapshot(table, generated_at).ok_or_else(|| ReportError::EmptyTable {
        path: paths.table.to_path_buf(),
    })?;
    let chart = chart::stage_chart(paths.chart, table, benchmark_label)?;
    let metrics = stage_metrics_json(paths.metrics, &snapshot)?;

    chart.commit()?;
    metrics.commit()?;
    Ok(snapshot)
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
