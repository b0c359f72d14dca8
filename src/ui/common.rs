//! Common UI components shared across views.
//!
//! This module contains the header bar, tab bar, status bar, and help overlay.

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Tabs},
    Frame,
};

use crate::app::{App, View};
use crate::monitor::ConnectionState;

/// Render the header bar with the link state.
///
/// Displays: connection indicator, device and transport, window count.
pub fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let indicator = match app.connection {
        ConnectionState::Connected => "●",
        ConnectionState::Connecting => "◌",
        ConnectionState::Disconnected => "○",
    };

    let mut spans = vec![
        Span::styled(
            format!(" {} ", indicator),
            app.theme.connection_style(app.connection),
        ),
        Span::styled("PULSEWATCH ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("│ "),
        Span::styled(
            app.connection.label(),
            app.theme.connection_style(app.connection),
        ),
        Span::raw(format!(" │ {} │ ", app.source_description())),
        Span::styled(
            app.history.windows.len().to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(" minutes"),
    ];

    let dropped = app.monitor().aggregator().dropped_lines();
    if dropped > 0 {
        spans.push(Span::styled(
            format!(" │ {} dropped", dropped),
            Style::default().add_modifier(Modifier::DIM),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Render the tab bar showing available views.
///
/// Highlights the currently active view.
pub fn render_tabs(frame: &mut Frame, app: &App, area: Rect) {
    let titles: Vec<Line> = vec![Line::from(" 1:Live "), Line::from(" 2:History ")];

    let selected = match app.current_view {
        View::Live => 0,
        View::History => 1,
    };

    let tabs = Tabs::new(titles)
        .select(selected)
        .style(app.theme.tab_inactive)
        .highlight_style(app.theme.tab_active)
        .divider("|");

    frame.render_widget(tabs, area);
}

/// Render the status bar at the bottom.
///
/// Temporary messages win, then the last error, then the link status text.
pub fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    if let Some(msg) = app.get_status_message() {
        let paragraph =
            Paragraph::new(format!(" {} ", msg)).style(Style::default().fg(app.theme.highlight));
        frame.render_widget(paragraph, area);
        return;
    }

    let controls = match (app.connection, app.current_view) {
        (ConnectionState::Disconnected, View::Live) => "c:connect Tab:switch ?:help q:quit",
        (ConnectionState::Disconnected, View::History) => {
            "c:connect ↑↓:select e:export Tab:switch ?:help q:quit"
        }
        (_, View::Live) => "c:disconnect Tab:switch ?:help q:quit",
        (_, View::History) => "c:disconnect ↑↓:select e:export Tab:switch ?:help q:quit",
    };

    if let Some(ref err) = app.last_error {
        let line = Line::from(vec![
            Span::styled(
                format!(" Error: {} ", err),
                Style::default().fg(app.theme.high),
            ),
            Span::styled(
                format!("| {}", controls),
                Style::default().add_modifier(Modifier::DIM),
            ),
        ]);
        frame.render_widget(Paragraph::new(line), area);
        return;
    }

    let status = format!(" {} | {}", app.connection_message, controls);
    let paragraph = Paragraph::new(status).style(Style::default().add_modifier(Modifier::DIM));
    frame.render_widget(paragraph, area);
}

/// Render the help overlay with keyboard shortcuts.
///
/// Displayed as a centered modal on top of the current view.
pub fn render_help(frame: &mut Frame, app: &App, area: Rect) {
    let section = |title: &'static str| {
        Line::from(vec![Span::styled(
            title,
            Style::default().add_modifier(Modifier::BOLD),
        )])
    };

    let help_text = vec![
        Line::from(vec![Span::styled("Keyboard Shortcuts", app.theme.header)]),
        Line::from(""),
        section(" Device"),
        Line::from("  c           Connect / disconnect"),
        Line::from(""),
        section(" Navigation"),
        Line::from("  Tab 1 2     Switch views"),
        Line::from("  ↑/↓ j/k     Select minute (History)"),
        Line::from("  Home/End    Jump to first/last"),
        Line::from(""),
        section(" General"),
        Line::from("  e         Export minutes to JSON"),
        Line::from("  ?         Toggle this help"),
        Line::from("  q         Disconnect and quit"),
        Line::from(""),
        Line::from(vec![Span::styled(
            "Press any key to close",
            Style::default().add_modifier(Modifier::DIM),
        )]),
    ];

    let block = Block::default()
        .title(" Help ")
        .borders(Borders::ALL)
        .border_type(app.theme.border_type)
        .border_style(Style::default().fg(app.theme.highlight));

    let paragraph = Paragraph::new(help_text).block(block);

    let help_width = 42u16.min(area.width.saturating_sub(4));
    let help_height = 19u16.min(area.height.saturating_sub(2));
    let x = area.x + (area.width.saturating_sub(help_width)) / 2;
    let y = area.y + (area.height.saturating_sub(help_height)) / 2;
    let help_area = Rect::new(x, y, help_width, help_height);

    frame.render_widget(Clear, help_area);
    frame.render_widget(paragraph, help_area);
}
