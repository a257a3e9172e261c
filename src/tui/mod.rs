//! Ratatui-based terminal UI for browsing the result table.
//!
//! Shows the composite against the benchmark (levels or YoY), the latest
//! metrics, and the most recent months. The table is read from disk; `r`
//! re-reads it after a rebuild in another terminal.

use std::io;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph},
    Terminal,
};

use crate::domain::{PipelineConfig, SeverityTable};
use crate::error::{AppError, EXIT_IO};
use crate::io::read_table;
use crate::report::chart::{bounds, chart_points, decimal_year};
use crate::report::metrics_snapshot;

mod plotters_chart;

use plotters_chart::SeverityPlottersChart;

const RECENT_MONTHS: usize = 12;

/// Start the TUI.
pub fn run(config: &PipelineConfig) -> Result<(), AppError> {
    let _guard = TerminalGuard::new()?;

    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)
        .map_err(|e| AppError::new(EXIT_IO, format!("Failed to initialize terminal: {e}")))?;

    let mut app = App::new(config.clone());
    app.event_loop(&mut terminal)
}

/// Ensures the terminal is restored (raw mode, alternate screen) on exit.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self, AppError> {
        enable_raw_mode().map_err(|e| AppError::new(EXIT_IO, format!("Failed to enable raw mode: {e}")))?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(AppError::new(EXIT_IO, format!("Failed to enter alternate screen: {e}")));
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ViewMode {
    Levels,
    YearOverYear,
}

impl ViewMode {
    fn toggle(self) -> Self {
        match self {
            ViewMode::Levels => ViewMode::YearOverYear,
            ViewMode::YearOverYear => ViewMode::Levels,
        }
    }

    fn title(self) -> &'static str {
        match self {
            ViewMode::Levels => "Index level",
            ViewMode::YearOverYear => "YoY change (%)",
        }
    }
}

/// Chart-ready series for one view mode.
#[derive(Debug, Clone, PartialEq)]
struct ChartData {
    composite: Vec<(f64, f64)>,
    benchmark: Vec<(f64, f64)>,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
}

struct App {
    config: PipelineConfig,
    table: Option<SeverityTable>,
    mode: ViewMode,
    status: String,
}

impl App {
    fn new(config: PipelineConfig) -> Self {
        let mut app = Self {
            config,
            table: None,
            mode: ViewMode::Levels,
            status: String::new(),
        };
        app.reload();
        app
    }

    fn reload(&mut self) {
        let path = self.config.table_path();
        match read_table(&path) {
            Ok(table) => {
                self.status = format!("Loaded {} rows from {}", table.rows.len(), path.display());
                self.table = Some(table);
            }
            Err(err) => {
                self.status = format!("{err} (run `sev build` first)");
            }
        }
    }

    fn event_loop<B: ratatui::backend::Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<(), AppError> {
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal
                    .draw(|f| self.draw(f))
                    .map_err(|e| AppError::new(EXIT_IO, format!("Terminal draw error: {e}")))?;
                needs_redraw = false;
            }

            if !event::poll(Duration::from_millis(100))
                .map_err(|e| AppError::new(EXIT_IO, format!("Event poll error: {e}")))?
            {
                continue;
            }

            match event::read().map_err(|e| AppError::new(EXIT_IO, format!("Event read error: {e}")))? {
                Event::Key(key) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key.code) {
                        break;
                    }
                    needs_redraw = true;
                }
                Event::Resize(_, _) => {
                    needs_redraw = true;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns true when the UI should exit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char('y') => {
                self.mode = self.mode.toggle();
                self.status = format!("view: {}", self.mode.title());
            }
            KeyCode::Char('r') => self.reload(),
            _ => {}
        }
        false
    }

    fn draw(&mut self, frame: &mut ratatui::Frame<'_>) {
        let size = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(5), Constraint::Min(0), Constraint::Length(3)])
            .split(size);

        self.draw_header(frame, chunks[0]);
        self.draw_body(frame, chunks[1]);
        self.draw_footer(frame, chunks[2]);
    }

    fn draw_header(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let mut lines: Vec<Line> = Vec::new();
        lines.push(Line::from(vec![
            Span::styled("sev", Style::default().fg(Color::Cyan)),
            Span::raw(format!(" - severity index vs {}", self.config.benchmark_id)),
        ]));

        match self.table.as_ref().and_then(|t| metrics_snapshot(t, "")) {
            Some(snap) => {
                lines.push(Line::from(Span::styled(
                    format!(
                        "as of {} | index {:.1} (YoY {}) | benchmark {:.1} (YoY {}) | gap {:+.1}",
                        snap.last_updated_date.format("%Y-%m"),
                        snap.composite_value,
                        fmt_pct(snap.yoy_change),
                        snap.benchmark_value,
                        fmt_pct(snap.benchmark_yoy_change),
                        snap.gap,
                    ),
                    Style::default().fg(Color::Gray),
                )));
                if let Some(table) = &self.table {
                    lines.push(Line::from(Span::styled(
                        format!("components: {}", table.component_ids.join(", ")),
                        Style::default().fg(Color::Gray),
                    )));
                }
            }
            None => lines.push(Line::from(Span::styled("no data", Style::default().fg(Color::Gray)))),
        }

        let p = Paragraph::new(Text::from(lines)).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_body(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(0), Constraint::Length(34)])
            .split(area);

        self.draw_chart(frame, chunks[0]);
        self.draw_recent(frame, chunks[1]);
    }

    fn draw_chart(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let title = format!("{} - red: index, cyan: {}", self.mode.title(), self.config.benchmark_id);
        let block = Block::default().title(title).borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        frame.render_widget(Clear, inner);

        let Some(data) = self.table.as_ref().and_then(|t| chart_data(t, self.mode)) else {
            let msg = Paragraph::new("Nothing to plot.")
                .style(Style::default().fg(Color::Yellow))
                .block(Block::default());
            frame.render_widget(msg, inner);
            return;
        };

        let (chart_rect, insets) = chart_layout(inner);
        let widget = SeverityPlottersChart {
            composite: &data.composite,
            benchmark: &data.benchmark,
            x_bounds: data.x_bounds,
            y_bounds: data.y_bounds,
            fmt_x: fmt_axis_year,
            fmt_y: fmt_axis_value,
        };

        frame.render_widget(widget, chart_rect);
        if let Some(insets) = insets {
            draw_axis_ticks(frame, inner, chart_rect, insets, data.x_bounds, data.y_bounds, self.mode.title());
        }
    }

    fn draw_recent(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let mut items = Vec::new();
        if let Some(table) = &self.table {
            let skip = table.rows.len().saturating_sub(RECENT_MONTHS);
            for r in table.rows[skip..].iter().rev() {
                let value = match self.mode {
                    ViewMode::Levels => format!("{:>8.1} {:>8.1}", r.composite_value, r.benchmark_value),
                    ViewMode::YearOverYear => format!(
                        "{:>8} {:>8}",
                        fmt_pct(r.yoy_change.map(|v| v * 100.0)),
                        fmt_pct(r.benchmark_yoy_change.map(|v| v * 100.0))
                    ),
                };
                items.push(ListItem::new(format!("{} {value}", r.date.format("%Y-%m"))));
            }
        }

        let list = List::new(items).block(Block::default().title("Recent (index / bm)").borders(Borders::ALL));
        frame.render_widget(list, area);
    }

    fn draw_footer(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let help = "y levels/YoY  r reload  q quit";
        let line = Line::from(vec![
            Span::styled(help, Style::default().fg(Color::Gray)),
            Span::raw(" | "),
            Span::styled(&self.status, Style::default().fg(Color::Yellow)),
        ]);
        let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }
}

/// Build chart series for Plotters. `None` when nothing plottable remains
/// (e.g. YoY view on less than a year of data).
fn chart_data(table: &SeverityTable, mode: ViewMode) -> Option<ChartData> {
    let (composite, benchmark) = match mode {
        ViewMode::Levels => chart_points(table),
        ViewMode::YearOverYear => {
            let pct = |v: Option<f64>| v.map(|v| v * 100.0);
            let composite = table
                .rows
                .iter()
                .filter_map(|r| pct(r.yoy_change).map(|y| (decimal_year(r.date), y)))
                .collect();
            let benchmark = table
                .rows
                .iter()
                .filter_map(|r| pct(r.benchmark_yoy_change).map(|y| (decimal_year(r.date), y)))
                .collect();
            (composite, benchmark)
        }
    };
    let (x_bounds, y_bounds) = bounds(&[composite.as_slice(), benchmark.as_slice()])?;
    Some(ChartData {
        composite,
        benchmark,
        x_bounds,
        y_bounds,
    })
}

fn fmt_pct(v: Option<f64>) -> String {
    v.map(|v| format!("{v:+.1}%")).unwrap_or_else(|| "n/a".to_string())
}

fn fmt_axis_year(v: f64) -> String {
    format!("{:.0}", v.floor())
}

fn fmt_axis_value(v: f64) -> String {
    format!("{v:.1}")
}

#[derive(Debug, Clone, Copy)]
struct AxisInsets {
    left: u16,
    right: u16,
    top: u16,
    bottom: u16,
}

fn chart_layout(inner: Rect) -> (Rect, Option<AxisInsets>) {
    let insets = AxisInsets {
        left: 8,
        right: 2,
        top: 1,
        bottom: 2,
    };

    if inner.width <= insets.left + insets.right + 10 || inner.height <= insets.top + insets.bottom + 5 {
        return (inner, None);
    }

    let rect = Rect {
        x: inner.x + insets.left,
        y: inner.y + insets.top,
        width: inner.width - insets.left - insets.right,
        height: inner.height - insets.top - insets.bottom,
    };

    (rect, Some(insets))
}

fn draw_axis_ticks(
    frame: &mut ratatui::Frame<'_>,
    inner: Rect,
    chart: Rect,
    insets: AxisInsets,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
    y_title: &str,
) {
    let ticks = 5usize;
    let style = Style::default().fg(Color::Gray);

    for i in 0..ticks {
        let u = i as f64 / (ticks as f64 - 1.0);
        let x_val = x_bounds[0] + u * (x_bounds[1] - x_bounds[0]);
        let x = chart.x + ((chart.width - 1) as f64 * u).round() as u16;
        let label = fmt_axis_year(x_val);
        let label_len = label.len() as u16;
        let start = x.saturating_sub(label_len / 2);
        let y = chart.y + chart.height;
        if y >= inner.y + inner.height - 1 {
            continue;
        }
        frame.render_widget(
            Paragraph::new(label).style(style),
            Rect {
                x: start,
                y,
                width: label_len,
                height: 1,
            },
        );
    }

    for i in 0..ticks {
        let u = i as f64 / (ticks as f64 - 1.0);
        let y_val = y_bounds[0] + u * (y_bounds[1] - y_bounds[0]);
        let y = chart.y + (chart.height - 1) - ((chart.height - 1) as f64 * u).round() as u16;
        let label = format!("{y_val:.0}");
        let label_len = label.len() as u16;
        let x = inner.x + insets.left.saturating_sub(1);
        let start = x.saturating_sub(label_len);
        if start < inner.x {
            continue;
        }
        frame.render_widget(
            Paragraph::new(label).style(style),
            Rect {
                x: start,
                y,
                width: label_len,
                height: 1,
            },
        );
    }

    let x_label = Paragraph::new("year")
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::Gray));
    let x_rect = Rect {
        x: chart.x,
        y: chart.y + chart.height + 1,
        width: chart.width,
        height: 1,
    };
    if x_rect.y < inner.y + inner.height {
        frame.render_widget(x_label, x_rect);
    }

    let y_label = Paragraph::new(y_title.to_string())
        .style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD));
    let y_rect = Rect {
        x: inner.x,
        y: inner.y,
        width: insets.left.saturating_sub(1) + insets.right,
        height: 1,
    };
    frame.render_widget(y_label, y_rect);
}
