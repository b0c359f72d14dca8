//! Theme configuration for the TUI.
//!
//! Supports light and dark themes with automatic terminal detection.

use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::block::BorderType;

use crate::data::StatusBand;
use crate::monitor::ConnectionState;

/// Color and style theme for the TUI.
///
/// Use [`Theme::auto_detect()`] for automatic theme selection based on
/// terminal background, or [`Theme::dark()`]/[`Theme::light()`] explicitly.
#[derive(Debug, Clone)]
pub struct Theme {
    /// Accent color for highlights and active elements.
    pub highlight: Color,
    /// Pulse below the low threshold.
    pub low: Color,
    /// Pulse inside the normal band.
    pub normal: Color,
    /// Pulse above the high threshold.
    pub high: Color,
    /// Line color of the averages chart.
    pub chart: Color,
    pub border: Color,
    pub header: Style,
    pub selected: Style,
    pub tab_active: Style,
    pub tab_inactive: Style,
    pub border_type: BorderType,
}

impl Theme {
    /// Create a dark theme suitable for dark terminal backgrounds.
    pub fn dark() -> Self {
        Self {
            highlight: Color::Cyan,
            low: Color::LightBlue,
            normal: Color::Green,
            high: Color::Red,
            chart: Color::Magenta,
            border: Color::Gray,
            header: Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            selected: Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD),
            tab_active: Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            tab_inactive: Style::default().fg(Color::Gray),
            border_type: BorderType::Rounded,
        }
    }

    /// Create a light theme suitable for light terminal backgrounds.
    pub fn light() -> Self {
        Self {
            highlight: Color::Blue,
            low: Color::Blue,
            normal: Color::Green,
            high: Color::Red,
            chart: Color::Magenta,
            border: Color::DarkGray,
            header: Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD),
            selected: Style::default().bg(Color::LightBlue).add_modifier(Modifier::BOLD),
            tab_active: Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD),
            tab_inactive: Style::default().fg(Color::DarkGray),
            border_type: BorderType::Rounded,
        }
    }

    /// Auto-detect based on terminal background
    pub fn auto_detect() -> Self {
        match terminal_light::luma() {
            Ok(luma) if luma > 0.5 => Self::light(),
            _ => Self::dark(),
        }
    }

    /// Get style for a status band
    pub fn band_style(&self, band: StatusBand) -> Style {
        match band {
            StatusBand::Low => Style::default().fg(self.low).add_modifier(Modifier::BOLD),
            StatusBand::Normal => Style::default().fg(self.normal),
            StatusBand::High => Style::default().fg(self.high).add_modifier(Modifier::BOLD),
        }
    }

    /// Get style for the connection indicator
    pub fn connection_style(&self, state: ConnectionState) -> Style {
        match state {
            ConnectionState::Connected => Style::default().fg(self.normal),
            ConnectionState::Connecting => Style::default().fg(Color::Yellow),
            ConnectionState::Disconnected => Style::default().fg(self.border),
        }
    }
}
