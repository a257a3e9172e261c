//! Shared domain types.
//!
//! These types are intentionally plain data so they can be:
//!
//! - passed between pipeline stages in-memory
//! - written to / read back from the CSV and JSON artifacts
//! - constructed directly in tests

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::retry::RetryPolicy;
use crate::error::ConfigError;

/// Overall CPI-U (all items, not seasonally adjusted).
pub const DEFAULT_BENCHMARK: &str = "CUUR0000SA0";
pub const DEFAULT_WEIGHTS_FILE: &str = "weights.csv";
pub const DEFAULT_WEIGHT_TOLERANCE: f64 = 0.001;
pub const DEFAULT_START_YEAR: i32 = 2010;

pub const RAW_DIR: &str = "raw";
pub const PROCESSED_DIR: &str = "processed";
pub const TABLE_FILE: &str = "severity_index.csv";
pub const METRICS_FILE: &str = "severity_metrics.json";
pub const CHART_FILE: &str = "severity_vs_benchmark.svg";

/// One dated value of a published series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: f64,
}

impl Observation {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// All fetched observations for a single series.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSeries {
    pub series_id: String,
    pub observations: Vec<Observation>,
}

impl RawSeries {
    pub fn new(series_id: impl Into<String>, observations: Vec<Observation>) -> Self {
        Self {
            series_id: series_id.into(),
            observations,
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.observations.first().map(|o| o.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.observations.last().map(|o| o.date)
    }
}

/// How much one series contributes to the composite.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightEntry {
    pub category: String,
    pub series_id: String,
    pub weight: f64,
}

/// A validated weights table, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightsTable {
    pub source: PathBuf,
    pub entries: Vec<WeightEntry>,
}

impl WeightsTable {
    pub fn total_weight(&self) -> f64 {
        self.entries.iter().map(|e| e.weight).sum()
    }

    pub fn series_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.series_id.as_str())
    }
}

/// One dated row of the composite index.
#[derive(Debug, Clone, PartialEq)]
pub struct SeverityRow {
    pub date: NaiveDate,
    pub composite_value: f64,
    /// Component values used, in the table's `component_ids` order.
    pub components: Vec<f64>,
    /// `None` when the row twelve months earlier is absent.
    pub yoy_change: Option<f64>,
    pub benchmark_value: f64,
    pub gap: f64,
    pub benchmark_yoy_change: Option<f64>,
}

/// The full composite index, ascending by date.
#[derive(Debug, Clone, PartialEq)]
pub struct SeverityTable {
    pub component_ids: Vec<String>,
    pub rows: Vec<SeverityRow>,
}

impl SeverityTable {
    pub fn latest(&self) -> Option<&SeverityRow> {
        self.rows.last()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|r| r.date).collect()
    }

    pub fn composite_by_date(&self) -> BTreeMap<NaiveDate, f64> {
        self.rows.iter().map(|r| (r.date, r.composite_value)).collect()
    }
}

/// The latest-row summary consumed by downstream pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub composite_value: f64,
    /// Percent, one decimal.
    pub yoy_change: Option<f64>,
    pub benchmark_value: f64,
    /// Percent, one decimal.
    pub benchmark_yoy_change: Option<f64>,
    pub gap: f64,
    pub last_updated_date: NaiveDate,
    pub generated_at: String,
}

/// Inclusive range of calendar years to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    pub fn new(start: i32, end: i32) -> Result<Self, ConfigError> {
        if start > end || start < 1900 {
            return Err(ConfigError::InvalidYearRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Split into consecutive windows of at most `max_years` years each.
    pub fn windows(self, max_years: i32) -> Vec<YearRange> {
        let span = max_years.max(1);
        let mut out = Vec::new();
        let mut start = self.start;
        while start <= self.end {
            let end = (start + span - 1).min(self.end);
            out.push(YearRange { start, end });
            start = end + 1;
        }
        out
    }
}

/// Options that change how the composite is computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuildOptions {
    /// Rebase every series to 100 at this date before weighting.
    pub base_date: Option<NaiveDate>,
}

/// Everything a pipeline stage needs to know about where things live and how
/// to run. Built once from CLI arguments.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub config_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub weights_file: String,
    pub benchmark_id: String,
    pub years: YearRange,
    pub build: BuildOptions,
    pub weight_tolerance: f64,
    pub retry: RetryPolicy,
}

impl PipelineConfig {
    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join(RAW_DIR)
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.data_dir.join(PROCESSED_DIR)
    }

    pub fn table_path(&self) -> PathBuf {
        self.processed_dir().join(TABLE_FILE)
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.assets_dir.join(METRICS_FILE)
    }

    pub fn chart_path(&self) -> PathBuf {
        self.assets_dir.join(CHART_FILE)
    }

    pub fn raw_series_path(&self, series_id: &str) -> PathBuf {
        crate::io::raw::raw_series_path(&self.raw_dir(), series_id)
    }

    /// Defaults rooted at `root`; used by tests and as the basis for CLI
    /// overrides.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            data_dir: root.join("data"),
            config_dir: root.join("config"),
            assets_dir: root.join("assets"),
            weights_file: DEFAULT_WEIGHTS_FILE.to_string(),
            benchmark_id: DEFAULT_BENCHMARK.to_string(),
            years: YearRange {
                start: DEFAULT_START_YEAR,
                end: DEFAULT_START_YEAR,
            },
            build: BuildOptions {
                base_date: NaiveDate::from_ymd_opt(DEFAULT_START_YEAR, 1, 1),
            },
            weight_tolerance: DEFAULT_WEIGHT_TOLERANCE,
            retry: RetryPolicy::none(),
        }
    }
}
