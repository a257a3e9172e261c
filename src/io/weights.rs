//! Weights table loading and validation.
//!
//! The weights file is user-edited, so this module is strict:
//! - the file name must resolve inside the config directory (canonical paths,
//!   compared component-wise) before anything is opened
//! - every row must carry a safe series id and a weight in `[0, 1]`
//! - weights must sum to 1.0 within the configured tolerance
//!
//! Header handling mirrors the rest of the CSV readers: names are trimmed,
//! lower-cased, and stripped of a UTF-8 BOM.

use std::collections::HashMap;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use csv::StringRecord;
use regex::Regex;

use crate::domain::{WeightEntry, WeightsTable};
use crate::error::ConfigError;
use crate::logging::Reporter;

static SERIES_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("series id pattern is valid"));

/// Series ids double as raw file names, so they are held to a file-stem
/// allow-list.
pub fn validate_series_id(series_id: &str) -> Result<(), ConfigError> {
    if SERIES_ID_PATTERN.is_match(series_id) {
        Ok(())
    } else {
        Err(ConfigError::InvalidSeriesId(series_id.to_string()))
    }
}

/// Resolve `name` against `config_dir`, refusing anything that lands outside it.
pub fn resolve_config_path(config_dir: &Path, name: &str) -> Result<PathBuf, ConfigError> {
    let unsafe_path = |reason: &str| ConfigError::UnsafePath {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(unsafe_path("empty file name"));
    }
    let candidate = Path::new(trimmed);
    if candidate.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(unsafe_path("parent-directory reference"));
    }

    let root = config_dir.canonicalize().map_err(|source| ConfigError::ConfigDir {
        path: config_dir.to_path_buf(),
        source,
    })?;
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };

    let resolved = match joined.canonicalize() {
        Ok(p) => p,
        Err(e) if e.kind() == ErrorKind::NotFound && joined.starts_with(&root) => {
            return Err(ConfigError::Read { path: joined, source: e });
        }
        Err(_) => return Err(unsafe_path("path cannot be resolved inside the config directory")),
    };

    if !resolved.starts_with(&root) {
        return Err(unsafe_path("resolves outside the config directory"));
    }
    if !resolved.is_file() {
        return Err(unsafe_path("not a regular file"));
    }
    Ok(resolved)
}

/// Load and validate the weights file `name` from `config_dir`.
pub fn load_weights(
    config_dir: &Path,
    name: &str,
    tolerance: f64,
    reporter: &dyn Reporter,
) -> Result<WeightsTable, ConfigError> {
    let path = resolve_config_path(config_dir, name)?;
    let file = File::open(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    let table = parse_weights(file, &path, tolerance, reporter)?;
    reporter.info(&format!(
        "Loaded {} weight entries from {}",
        table.entries.len(),
        path.display()
    ));
    Ok(table)
}

/// Parse and validate weights CSV content. `path` is only used for messages.
pub fn parse_weights<R: Read>(
    input: R,
    path: &Path,
    tolerance: f64,
    reporter: &dyn Reporter,
) -> Result<WeightsTable, ConfigError> {
    if !(tolerance.is_finite() && tolerance >= 0.0) {
        return Err(ConfigError::InvalidTolerance(tolerance));
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(input);

    let headers = reader
        .headers()
        .map_err(|source| ConfigError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .clone();
    let header_map = build_header_map(&headers);
    let category_idx = required_column(&header_map, path, "category")?;
    let series_idx = required_column(&header_map, path, "series_id")?;
    let weight_idx = required_column(&header_map, path, "weight")?;

    let mut entries: Vec<WeightEntry> = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record = result.map_err(|source| ConfigError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let invalid = |message: String| ConfigError::InvalidEntry {
            path: path.to_path_buf(),
            line,
            message,
        };

        let category = field(&record, category_idx);
        let series_id = field(&record, series_idx);
        let raw_weight = field(&record, weight_idx);

        if category.is_empty() && series_id.is_empty() && raw_weight.is_empty() {
            continue;
        }
        if category.is_empty() {
            return Err(invalid("Missing `category`.".to_string()));
        }
        validate_series_id(series_id).map_err(|e| invalid(e.to_string()))?;

        let weight = raw_weight
            .parse::<f64>()
            .map_err(|_| invalid(format!("Weight '{raw_weight}' is not a number.")))?;
        if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
            return Err(invalid(format!("Weight {raw_weight} must be within [0, 1].")));
        }

        if let Some(existing) = entries.iter().find(|e| e.series_id == series_id) {
            if (existing.weight - weight).abs() > 1e-12 {
                return Err(ConfigError::ConflictingWeights {
                    path: path.to_path_buf(),
                    series_id: series_id.to_string(),
                    first: existing.weight,
                    second: weight,
                });
            }
            reporter.warn(&format!(
                "Ignoring duplicate weight for {series_id} ('{category}') on line {line}"
            ));
            continue;
        }

        entries.push(WeightEntry {
            category: category.to_string(),
            series_id: series_id.to_string(),
            weight,
        });
    }

    if entries.is_empty() {
        return Err(ConfigError::EmptyWeights {
            path: path.to_path_buf(),
        });
    }

    let sum: f64 = entries.iter().map(|e| e.weight).sum();
    if (sum - 1.0).abs() > tolerance + 1e-12 {
        return Err(ConfigError::WeightSum {
            path: path.to_path_buf(),
            sum,
            tolerance,
        });
    }

    for e in &entries {
        reporter.debug(&format!("weight {:.4} -> {} ({})", e.weight, e.series_id, e.category));
    }

    Ok(WeightsTable {
        source: path.to_path_buf(),
        entries,
    })
}

pub(crate) fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn required_column(
    header_map: &HashMap<String, usize>,
    path: &Path,
    column: &'static str,
) -> Result<usize, ConfigError> {
    header_map.get(column).copied().ok_or(ConfigError::MissingColumn {
        path: path.to_path_buf(),
        column,
    })
}

fn field(record: &StringRecord, idx: usize) -> &str {
    record.get(idx).map(str::trim).unwrap_or("")
}
