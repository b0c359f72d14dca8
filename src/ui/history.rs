//! History view rendering.
//!
//! Displays a table of every minute window closed during this run.

use chrono::Local;
use ratatui::{
    layout::{Constraint, Rect},
    style::{Modifier, Style},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame,
};

use crate::app::App;
use crate::data::duration::format_duration;

/// Render the History view, newest window last.
pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(app.theme.border_type)
        .border_style(Style::default().fg(app.theme.border));

    if app.history.windows.is_empty() {
        let paragraph = Paragraph::new(" No minute averages yet")
            .style(Style::default().add_modifier(Modifier::DIM))
            .block(block.title(" Minutes "));
        frame.render_widget(paragraph, area);
        return;
    }

    let header = Row::new(vec![
        Cell::from("#"),
        Cell::from("Closed"),
        Cell::from("Span"),
        Cell::from("Average"),
        Cell::from("Samples"),
        Cell::from("Status"),
    ])
    .height(1)
    .style(app.theme.header);

    let rows: Vec<Row> = app
        .history
        .windows
        .iter()
        .map(|p| {
            let span = (p.result.window_end - p.result.window_start)
                .to_std()
                .map(format_duration)
                .unwrap_or_else(|_| "-".to_string());
            let band_style = app.theme.band_style(p.status);

            Row::new(vec![
                Cell::from(format!("{:.0}", p.minute)),
                Cell::from(
                    p.result
                        .window_end
                        .with_timezone(&Local)
                        .format("%H:%M:%S")
                        .to_string(),
                ),
                Cell::from(span),
                Cell::from(format!("{:.1} BPM", p.result.average)).style(band_style),
                Cell::from(p.result.sample_count.to_string()),
                Cell::from(p.status.label()).style(band_style),
            ])
        })
        .collect();

    let widths = [
        Constraint::Length(5),
        Constraint::Fill(2),
        Constraint::Fill(1),
        Constraint::Fill(2),
        Constraint::Fill(1),
        Constraint::Min(8),
    ];

    let count = app.history.windows.len();
    let selected = app.selected_window_index.min(count.saturating_sub(1));
    let title = format!(" Minutes ({}) [{}/{}] ", count, selected + 1, count);

    let table = Table::new(rows, widths)
        .header(header)
        .block(block.title(title))
        .row_highlight_style(app.theme.selected)
        .highlight_symbol("▶ ");

    let mut state = TableState::default();
    state.select(Some(selected));

    frame.render_stateful_widget(table, area, &mut state);
}
