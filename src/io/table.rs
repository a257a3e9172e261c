//! Severity result table CSV.
//!
//! Layout:
//!
//! `date,composite_value,<component ids...>,yoy_change,benchmark_value,gap,benchmark_yoy_change`
//!
//! Numbers use a fixed six-decimal format so rebuilding from unchanged inputs
//! produces an identical file. Undefined YoY values are empty cells.

use std::fs::File;
use std::path::Path;

use chrono::NaiveDate;
use csv::StringRecord;

use crate::domain::{SeverityRow, SeverityTable};
use crate::error::{ReportError, WriteError};
use crate::io::atomic::write_atomic;

const LEADING: [&str; 2] = ["date", "composite_value"];
const TRAILING: [&str; 4] = ["yoy_change", "benchmark_value", "gap", "benchmark_yoy_change"];

pub fn write_table(path: &Path, table: &SeverityTable) -> Result<(), WriteError> {
    write_atomic(path, |w| {
        let mut wtr = csv::Writer::from_writer(w);

        let mut header: Vec<&str> = LEADING.to_vec();
        header.extend(table.component_ids.iter().map(String::as_str));
        header.extend(TRAILING);
        wtr.write_record(&header)?;

        for row in &table.rows {
            let mut record = Vec::with_capacity(header.len());
            record.push(row.date.format("%Y-%m-%d").to_string());
            record.push(fmt_num(row.composite_value));
            record.extend(row.components.iter().map(|&v| fmt_num(v)));
            record.push(fmt_opt(row.yoy_change));
            record.push(fmt_num(row.benchmark_value));
            record.push(fmt_num(row.gap));
            record.push(fmt_opt(row.benchmark_yoy_change));
            wtr.write_record(&record)?;
        }
        wtr.flush()
    })
}

pub fn read_table(path: &Path) -> Result<SeverityTable, ReportError> {
    let file = File::open(path).map_err(|source| ReportError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|source| ReportError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .clone();
    let component_ids = component_columns(&headers).ok_or_else(|| ReportError::MalformedTable {
        path: path.to_path_buf(),
        line: 1,
        message: format!(
            "Expected header `{}, <components>, {}`.",
            LEADING.join(","),
            TRAILING.join(",")
        ),
    })?;
    let n = component_ids.len();

    let mut rows: Vec<SeverityRow> = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record = result.map_err(|source| ReportError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let row = parse_row(&record, n).map_err(|message| ReportError::MalformedTable {
            path: path.to_path_buf(),
            line,
            message,
        })?;
        if let Some(prev) = rows.last() {
            if row.date <= prev.date {
                return Err(ReportError::MalformedTable {
                    path: path.to_path_buf(),
                    line,
                    message: format!("Date {} does not follow {}.", row.date, prev.date),
                });
            }
        }
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(ReportError::EmptyTable {
            path: path.to_path_buf(),
        });
    }

    Ok(SeverityTable { component_ids, rows })
}

fn component_columns(headers: &StringRecord) -> Option<Vec<String>> {
    let names: Vec<String> = headers
        .iter()
        .map(|h| h.trim().trim_start_matches('\u{feff}').to_ascii_lowercase())
        .collect();
    if names.len() < LEADING.len() + TRAILING.len() {
        return None;
    }
    let tail_start = names.len() - TRAILING.len();
    if names[..LEADING.len()] != LEADING || names[tail_start..] != TRAILING {
        return None;
    }
    // Component ids keep their case as written.
    Some(
        headers
            .iter()
            .skip(LEADING.len())
            .take(tail_start - LEADING.len())
            .map(|h| h.trim().to_string())
            .collect(),
    )
}

fn parse_row(record: &StringRecord, n_components: usize) -> Result<SeverityRow, String> {
    let cell = |idx: usize| record.get(idx).unwrap_or("");
    let raw_date = cell(0);
    let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d")
        .map_err(|e| format!("Invalid date '{raw_date}': {e}"))?;

    let composite_value = parse_num(cell(1), "composite_value")?;
    let mut components = Vec::with_capacity(n_components);
    for i in 0..n_components {
        components.push(parse_num(cell(2 + i), "component")?);
    }
    let base = 2 + n_components;

    Ok(SeverityRow {
        date,
        composite_value,
        components,
        yoy_change: parse_opt_num(cell(base), "yoy_change")?,
        benchmark_value: parse_num(cell(base + 1), "benchmark_value")?,
        gap: parse_num(cell(base + 2), "gap")?,
        benchmark_yoy_change: parse_opt_num(cell(base + 3), "benchmark_yoy_change")?,
    })
}

fn parse_num(s: &str, name: &str) -> Result<f64, String> {
    s.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("Missing/invalid `{name}` value '{s}'."))
}

fn parse_opt_num(s: &str, name: &str) -> Result<Option<f64>, String> {
    if s.is_empty() {
        return Ok(None);
    }
    parse_num(s, name).map(Some)
}

fn fmt_num(v: f64) -> String {
    format!("{v:.6}")
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(fmt_num).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn sample() -> SeverityTable {
        SeverityTable {
            component_ids: vec!["CUUR0000SETA".to_string(), "CUUR0000SAH1".to_string()],
            rows: vec![
                SeverityRow {
                    date: d(2024, 1),
                    composite_value: 150.5,
                    components: vec![140.0, 161.0],
                    yoy_change: None,
                    benchmark_value: 148.0,
                    gap: 2.5,
                    benchmark_yoy_change: None,
                },
                SeverityRow {
                    date: d(2025, 1),
                    composite_value: 155.3,
                    components: vec![146.0, 164.6],
                    yoy_change: Some(155.3 / 150.5 - 1.0),
                    benchmark_value: 152.0,
                    gap: 3.3,
                    benchmark_yoy_change: Some(152.0 / 148.0 - 1.0),
                },
            ],
        }
    }

    #[test]
    fn writes_fixed_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("severity_index.csv");
        write_table(&path, &sample()).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "date,composite_value,CUUR0000SETA,CUUR0000SAH1,yoy_change,benchmark_value,gap,benchmark_yoy_change"
        );
        assert_eq!(
            lines.next().unwrap(),
            "2024-01-01,150.500000,140.000000,161.000000,,148.000000,2.500000,"
        );
        assert!(lines.next().unwrap().starts_with("2025-01-01,155.300000,"));
    }

    #[test]
    fn reads_back_what_was_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("severity_index.csv");
        write_table(&path, &sample()).unwrap();

        let table = read_table(&path).unwrap();
        assert_eq!(table.component_ids, sample().component_ids);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].yoy_change, None);
        let yoy = table.rows[1].yoy_change.unwrap();
        assert!((yoy - 0.031894).abs() < 1e-6);
    }

    #[test]
    fn rejects_out_of_order_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        fs::write(
            &path,
            "date,composite_value,yoy_change,benchmark_value,gap,benchmark_yoy_change\n\
             2024-02-01,1,,1,0,\n2024-01-01,1,,1,0,\n",
        )
        .unwrap();
        assert!(matches!(read_table(&path), Err(ReportError::MalformedTable { line: 3, .. })));
    }

    #[test]
    fn rejects_unexpected_header_and_empty_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        fs::write(&path, "date,value\n2024-01-01,1\n").unwrap();
        assert!(matches!(read_table(&path), Err(ReportError::MalformedTable { line: 1, .. })));

        fs::write(&path, "date,composite_value,yoy_change,benchmark_value,gap,benchmark_yoy_change\n").unwrap();
        assert!(matches!(read_table(&path), Err(ReportError::EmptyTable { .. })));
    }
}
