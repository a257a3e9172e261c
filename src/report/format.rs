//! Formatted terminal output.
//!
//! Formatting lives here so pipeline code only deals with values and output
//! changes stay in one place.

use crate::domain::{MetricsSnapshot, SeverityRow, SeverityTable};

/// Summary of the latest row, as printed after `emit`.
pub fn format_latest_summary(snapshot: &MetricsSnapshot, benchmark_id: &str) -> String {
    let mut out = String::new();

    out.push_str("=== sev - Severity Index ===\n");
    out.push_str(&format!("As of: {}\n", snapshot.last_updated_date.format("%Y-%m")));
    out.push_str(&format!(
        "Severity index : {:>8.1}  YoY {}\n",
        snapshot.composite_value,
        fmt_pct(snapshot.yoy_change)
    ));
    out.push_str(&format!(
        "{:<15}: {:>8.1}  YoY {}\n",
        truncate(benchmark_id, 15),
        snapshot.benchmark_value,
        fmt_pct(snapshot.benchmark_yoy_change)
    ));
    out.push_str(&format!("Gap            : {:>+8.1}\n", snapshot.gap));

    out
}

/// The last `n` rows of the table, oldest first.
pub fn format_recent_rows(table: &SeverityTable, n: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<8} {:>10} {:>8} {:>10} {:>8} {:>8}\n",
        "month", "index", "yoy", "benchmark", "bm yoy", "gap"
    ));
    out.push_str(&format!(
        "{:-<8} {:-<10} {:-<8} {:-<10} {:-<8} {:-<8}\n",
        "", "", "", "", "", ""
    ));

    let skip = table.rows.len().saturating_sub(n);
    for r in &table.rows[skip..] {
        out.push_str(&format_row(r));
        out.push('\n');
    }
    out
}

fn format_row(r: &SeverityRow) -> String {
    format!(
        "{:<8} {:>10.2} {:>8} {:>10.2} {:>8} {:>+8.2}",
        r.date.format("%Y-%m"),
        r.composite_value,
        fmt_pct(r.yoy_change.map(|v| v * 100.0)),
        r.benchmark_value,
        fmt_pct(r.benchmark_yoy_change.map(|v| v * 100.0)),
        r.gap,
    )
}

fn fmt_pct(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{v:+.1}%"),
        None => "n/a".to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
