//! Static SVG chart of the composite against the benchmark.
//!
//! Rendered with the Plotters SVG backend into a string, then staged for an
//! atomic write like every other artifact.

use std::error::Error;
use std::io::Write;
use std::path::Path;

use chrono::{Datelike, NaiveDate};
use plotters::prelude::*;

use crate::domain::SeverityTable;
use crate::error::ReportError;
use crate::io::atomic::{StagedFile, stage_atomic};

const WIDTH: u32 = 1000;
const HEIGHT: u32 = 500;

const COMPOSITE_COLOR: RGBColor = RGBColor(0xdc, 0x26, 0x26);
const BENCHMARK_COLOR: RGBColor = RGBColor(0x25, 0x63, 0xeb);

/// Decimal year, so monthly points are evenly spaced on a numeric axis.
pub fn decimal_year(date: NaiveDate) -> f64 {
    date.year() as f64 + date.month0() as f64 / 12.0
}

/// Composite and benchmark series as `(decimal year, value)` pairs.
pub fn chart_points(table: &SeverityTable) -> (Vec<(f64, f64)>, Vec<(f64, f64)>) {
    let composite = table
        .rows
        .iter()
        .map(|r| (decimal_year(r.date), r.composite_value))
        .collect();
    let benchmark = table
        .rows
        .iter()
        .map(|r| (decimal_year(r.date), r.benchmark_value))
        .collect();
    (composite, benchmark)
}

/// Padded `[min, max]` bounds over all points, or `None` when there is nothing
/// finite to plot.
pub fn bounds(series: &[&[(f64, f64)]]) -> Option<([f64; 2], [f64; 2])> {
    let (mut x0, mut x1) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut y0, mut y1) = (f64::INFINITY, f64::NEG_INFINITY);
    for &(x, y) in series.iter().flat_map(|s| s.iter()) {
        x0 = x0.min(x);
        x1 = x1.max(x);
        y0 = y0.min(y);
        y1 = y1.max(y);
    }
    if !(x0.is_finite() && x1.is_finite() && y0.is_finite() && y1.is_finite()) {
        return None;
    }
    if x1 <= x0 {
        x1 = x0 + 1.0 / 12.0;
    }
    let pad = ((y1 - y0).abs() * 0.05).max(0.5);
    Some(([x0, x1], [y0 - pad, y1 + pad]))
}

pub fn render_svg(table: &SeverityTable, benchmark_label: &str) -> Result<String, Box<dyn Error>> {
    let (composite, benchmark) = chart_points(table);
    let (x_bounds, y_bounds) = bounds(&[composite.as_slice(), benchmark.as_slice()]).ok_or("no finite values to plot")?;

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(format!("Severity Index vs {benchmark_label}"), ("sans-serif", 20))
            .margin(12)
            .set_label_area_size(LabelAreaPosition::Left, 50)
            .set_label_area_size(LabelAreaPosition::Bottom, 35)
            .build_cartesian_2d(x_bounds[0]..x_bounds[1], y_bounds[0]..y_bounds[1])?;

        chart
            .configure_mesh()
            .light_line_style(WHITE)
            .x_labels(10)
            .y_labels(8)
            .x_label_formatter(&|v| format!("{:.0}", v.floor()))
            .y_label_formatter(&|v| format!("{v:.0}"))
            .y_desc("Index level")
            .draw()?;

        chart
            .draw_series(LineSeries::new(benchmark, BENCHMARK_COLOR.stroke_width(2)))?
            .label(benchmark_label.to_string())
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BENCHMARK_COLOR.stroke_width(2)));

        chart
            .draw_series(LineSeries::new(composite, COMPOSITE_COLOR.stroke_width(2)))?
            .label("Severity Index")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], COMPOSITE_COLOR.stroke_width(2)));

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;

        root.present()?;
    }
    Ok(svg)
}

/// Render the chart and stage it next to `path`.
pub fn stage_chart(path: &Path, table: &SeverityTable, benchmark_label: &str) -> Result<StagedFile, ReportError> {
    let svg = render_svg(table, benchmark_label).map_err(|e| ReportError::Chart {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(stage_atomic(path, |w| w.write_all(svg.as_bytes()))?)
}
