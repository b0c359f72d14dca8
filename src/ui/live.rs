//! Live view rendering.
//!
//! Top row: current reading, last minute average, device-reported average.
//! Below: a sparkline of recent readings and a chart of minute averages.

use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
    Frame,
};

use crate::app::App;
use crate::data::StatusBand;

/// Sparkline characters (8 levels of height).
const SPARKLINE_CHARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Render the Live view.
pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::vertical([
        Constraint::Length(5), // Value panels
        Constraint::Length(3), // Sparkline
        Constraint::Min(6),    // Chart
    ])
    .split(area);

    render_panels(frame, app, chunks[0]);
    render_trend(frame, app, chunks[1]);
    render_chart(frame, app, chunks[2]);
}

fn render_panels(frame: &mut Frame, app: &App, area: Rect) {
    let columns = Layout::horizontal([
        Constraint::Fill(1),
        Constraint::Fill(1),
        Constraint::Fill(1),
    ])
    .split(area);

    let current = value_panel(app, app.live.bpm, app.live.status);
    frame.render_widget(current.block(panel_block(app, " Pulse ")), columns[0]);

    let (average, band) = match app.live.last_window {
        Some((result, band)) => (Some(result.average), Some(band)),
        None => (None, None),
    };
    let minute = value_panel(app, average, band);
    frame.render_widget(minute.block(panel_block(app, " Minute average ")), columns[1]);

    let device = value_panel(app, app.live.device_average, None);
    frame.render_widget(device.block(panel_block(app, " Device average ")), columns[2]);
}

fn value_panel<'a>(app: &App, value: Option<f32>, band: Option<StatusBand>) -> Paragraph<'a> {
    let value_line = match value {
        Some(v) => Line::from(vec![
            Span::styled(
                format!("{:.1}", v),
                band.map(|b| app.theme.band_style(b))
                    .unwrap_or_default()
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(" BPM"),
        ]),
        None => Line::from(Span::styled("--", Style::default().add_modifier(Modifier::DIM))),
    };

    let band_line = match band {
        Some(b) => Line::from(Span::styled(b.advice(), app.theme.band_style(b))),
        None => Line::from(""),
    };

    Paragraph::new(vec![value_line, band_line]).alignment(Alignment::Center)
}

fn panel_block<'a>(app: &App, title: impl Into<Line<'a>>) -> Block<'a> {
    Block::default()
        .title(title.into())
        .borders(Borders::ALL)
        .border_type(app.theme.border_type)
        .border_style(Style::default().fg(app.theme.border))
}

fn render_trend(frame: &mut Frame, app: &App, area: Rect) {
    let width = area.width.saturating_sub(2) as usize;
    let sparkline = render_sparkline(&app.history.readings_sparkline(), width);

    let since = app
        .live
        .last_reading_at
        .map(|t| format!(" last {:.1}s ago ", t.elapsed().as_secs_f64()))
        .unwrap_or_default();

    let block = panel_block(app, " Recent readings ").title_bottom(
        Line::from(since)
            .alignment(Alignment::Right)
            .style(Style::default().add_modifier(Modifier::DIM)),
    );

    let paragraph = Paragraph::new(sparkline)
        .style(Style::default().fg(app.theme.highlight))
        .block(block);
    frame.render_widget(paragraph, area);
}

fn render_chart(frame: &mut Frame, app: &App, area: Rect) {
    let points = app.history.chart_points();
    let [y_min, y_max] = app.history.chart_bounds();
    let [x_min, x_max] = app.history.chart_x_bounds();
    let thresholds = app.monitor().aggregator().thresholds();

    let low_line = [(x_min, thresholds.low_bpm as f64), (x_max, thresholds.low_bpm as f64)];
    let high_line = [(x_min, thresholds.high_bpm as f64), (x_max, thresholds.high_bpm as f64)];

    let mut datasets = vec![Dataset::default()
        .name("avg BPM")
        .marker(Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(app.theme.chart))
        .data(&points)];

    // Only draw band edges that fall inside the visible range.
    if (y_min..=y_max).contains(&(thresholds.low_bpm as f64)) {
        datasets.push(
            Dataset::default()
                .marker(Marker::Dot)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(app.theme.low).add_modifier(Modifier::DIM))
                .data(&low_line),
        );
    }
    if (y_min..=y_max).contains(&(thresholds.high_bpm as f64)) {
        datasets.push(
            Dataset::default()
                .marker(Marker::Dot)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(app.theme.high).add_modifier(Modifier::DIM))
                .data(&high_line),
        );
    }

    let title = if points.is_empty() {
        " Minute averages (waiting for the first minute) ".to_string()
    } else {
        format!(" Minute averages ({}) ", points.len())
    };

    let chart = Chart::new(datasets)
        .block(panel_block(app, title))
        .x_axis(
            Axis::default()
                .title("minute")
                .style(Style::default().fg(app.theme.border))
                .bounds([x_min, x_max])
                .labels(vec![
                    Span::raw(format!("{:.0}", x_min)),
                    Span::raw(format!("{:.0}", x_max)),
                ]),
        )
        .y_axis(
            Axis::default()
                .title("BPM")
                .style(Style::default().fg(app.theme.border))
                .bounds([y_min, y_max])
                .labels(vec![
                    Span::raw(format!("{:.0}", y_min)),
                    Span::raw(format!("{:.0}", (y_min + y_max) / 2.0)),
                    Span::raw(format!("{:.0}", y_max)),
                ]),
        );

    frame.render_widget(chart, area);
}

/// Render the most recent `width` sparkline levels.
fn render_sparkline(data: &[u8], width: usize) -> String {
    if data.is_empty() {
        return String::new();
    }
    let skip = data.len().saturating_sub(width);
    data[skip..]
        .iter()
        .map(|&v| SPARKLINE_CHARS[v.min(7) as usize])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_sparkline_keeps_latest() {
        assert_eq!(render_sparkline(&[0, 7, 3], 2), "█▄");
        assert_eq!(render_sparkline(&[], 8), "");
        assert_eq!(render_sparkline(&[9], 8), "█");
    }
}
