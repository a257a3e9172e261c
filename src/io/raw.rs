//! Raw series storage: one `date,value` CSV per series id.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::domain::{Observation, RawSeries};
use crate::error::{BuildError, WriteError};
use crate::io::atomic::{StagedFile, stage_atomic};
use crate::io::weights::build_header_map;

pub fn raw_series_path(raw_dir: &Path, series_id: &str) -> PathBuf {
    raw_dir.join(format!("{series_id}.csv"))
}

/// Stage the stored file for `series.series_id` without replacing it yet.
pub fn stage_raw_series(raw_dir: &Path, series: &RawSeries) -> Result<StagedFile, WriteError> {
    let path = raw_series_path(raw_dir, &series.series_id);
    stage_atomic(&path, |w| {
        let mut wtr = csv::Writer::from_writer(w);
        wtr.write_record(["date", "value"])?;
        for obs in &series.observations {
            wtr.write_record([obs.date.format("%Y-%m-%d").to_string(), obs.value.to_string()])?;
        }
        wtr.flush()
    })
}

/// Overwrite the stored file for `series.series_id`.
pub fn write_raw_series(raw_dir: &Path, series: &RawSeries) -> Result<PathBuf, WriteError> {
    stage_raw_series(raw_dir, series)?.commit()
}

/// Read a stored series in file order. Ordering is checked by the builder.
pub fn read_raw_series(path: &Path, series_id: &str) -> Result<RawSeries, BuildError> {
    let file = File::open(path).map_err(|source| BuildError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|source| BuildError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .clone();
    let header_map = build_header_map(&headers);
    let date_idx = column(&header_map, path, "date")?;
    let value_idx = column(&header_map, path, "value")?;

    let mut observations = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record = result.map_err(|source| BuildError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let malformed = |message: String| BuildError::MalformedSeries {
            path: path.to_path_buf(),
            line,
            message,
        };

        let raw_date = record.get(date_idx).unwrap_or("");
        let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d")
            .map_err(|e| malformed(format!("Invalid date '{raw_date}': {e}")))?;
        let raw_value = record.get(value_idx).unwrap_or("");
        let value = raw_value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| malformed(format!("Invalid value '{raw_value}'")))?;

        observations.push(Observation::new(date, value));
    }

    Ok(RawSeries::new(series_id, observations))
}

fn column(header_map: &HashMap<String, usize>, path: &Path, name: &str) -> Result<usize, BuildError> {
    header_map.get(name).copied().ok_or_else(|| BuildError::MalformedSeries {
        path: path.to_path_buf(),
        line: 1,
        message: format!("Missing required column: `{name}`"),
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    #[test]
    fn written_series_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let series = RawSeries::new(
            "CUUR0000SAH1",
            vec![Observation::new(d(2024, 1), 401.25), Observation::new(d(2024, 2), 402.5)],
        );

        let path = write_raw_series(dir.path(), &series).unwrap();
        assert_eq!(path, dir.path().join("CUUR0000SAH1.csv"));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "date,value\n2024-01-01,401.25\n2024-02-01,402.5\n"
        );
        assert_eq!(read_raw_series(&path, "CUUR0000SAH1").unwrap(), series);
    }

    #[test]
    fn abandoned_batch_keeps_stored_series() {
        let dir = tempfile::tempdir().unwrap();
        let old = RawSeries::new("CUUR0000SAH1", vec![Observation::new(d(2023, 12), 1.0)]);
        let path = write_raw_series(dir.path(), &old).unwrap();
        let before = fs::read(&path).unwrap();

        let fresh = RawSeries::new("CUUR0000SAH1", vec![Observation::new(d(2024, 1), 2.0)]);
        let other = RawSeries::new("CUUR0000SA0", vec![Observation::new(d(2024, 1), 3.0)]);
        let staged = vec![
            stage_raw_series(dir.path(), &fresh).unwrap(),
            stage_raw_series(dir.path(), &other).unwrap(),
        ];
        assert_eq!(staged[1].path(), raw_series_path(dir.path(), "CUUR0000SA0"));
        drop(staged);

        assert_eq!(fs::read(&path).unwrap(), before);
        assert!(!raw_series_path(dir.path(), "CUUR0000SA0").exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn bad_rows_report_line_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("X.csv");
        fs::write(&path, "date,value\n2024-01-01,1.0\n2024-02-01,n/a\n").unwrap();

        match read_raw_series(&path, "X").unwrap_err() {
            BuildError::MalformedSeries { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_value_column_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("X.csv");
        fs::write(&path, "date,level\n2024-01-01,1.0\n").unwrap();
        assert!(matches!(
            read_raw_series(&path, "X"),
            Err(BuildError::MalformedSeries { line: 1, .. })
        ));
    }
}
