//! Plotters-powered severity chart widget for Ratatui.
//!
//! Plotters output is drawn into the Ratatui buffer via
//! `plotters-ratatui-backend`, so the terminal chart and the SVG artifact share
//! one drawing API.

use plotters::prelude::*;
use plotters_ratatui_backend::widget_fn;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::Widget,
};

/// Render-only chart description. Series and bounds are computed by the caller.
pub struct SeverityPlottersChart<'a> {
    /// Composite index line, `(decimal year, value)`.
    pub composite: &'a [(f64, f64)],
    /// Benchmark line, same x units.
    pub benchmark: &'a [(f64, f64)],
    pub x_bounds: [f64; 2],
    pub y_bounds: [f64; 2],
    pub fmt_x: fn(f64) -> String,
    pub fmt_y: fn(f64) -> String,
}

impl<'a> Widget for SeverityPlottersChart<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Plotters cannot lay out a chart in a tiny area.
        if area.width < 20 || area.height < 8 {
            buf.set_string(
                area.x,
                area.y,
                "Chart area too small (resize terminal).",
                Style::default().fg(Color::Yellow),
            );
            return;
        }

        let [x0, x1] = self.x_bounds;
        let [y0, y1] = self.y_bounds;
        if !(x0.is_finite() && x1.is_finite() && y0.is_finite() && y1.is_finite()) || x1 <= x0 || y1 <= y0 {
            return;
        }

        let widget = widget_fn(move |root| {
            let mut chart = ChartBuilder::on(&root)
                .margin(1)
                .set_label_area_size(LabelAreaPosition::Left, 6)
                .set_label_area_size(LabelAreaPosition::Bottom, 3)
                .build_cartesian_2d(x0..x1, y0..y1)?;

            // Mesh lines are noise at terminal resolution.
            chart
                .configure_mesh()
                .disable_x_mesh()
                .disable_y_mesh()
                .x_labels(5)
                .y_labels(5)
                .x_label_formatter(&|v| (self.fmt_x)(*v))
                .y_label_formatter(&|v| (self.fmt_y)(*v))
                .label_style(("sans-serif", 10).into_font().color(&WHITE))
                .axis_style(&WHITE)
                .bold_line_style(&WHITE)
                .draw()?;

            let composite_color = RGBColor(255, 80, 80);
            let benchmark_color = RGBColor(0, 255, 255);

            chart.draw_series(LineSeries::new(self.benchmark.iter().copied(), &benchmark_color))?;
            chart.draw_series(LineSeries::new(self.composite.iter().copied(), &composite_color))?;

            Ok(())
        });

        widget.render(area, buf);
    }
}
