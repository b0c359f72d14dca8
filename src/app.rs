//! Application state and navigation logic.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::data::{History, StatusBand, WindowResult};
use crate::monitor::{ConnectionState, Monitor, Update};
use crate::ui::Theme;

/// How long a temporary status message stays visible.
const STATUS_MESSAGE_TTL: Duration = Duration::from_secs(3);

/// The current view/tab in the TUI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Current reading, minute average, and the averages chart.
    Live,
    /// Table of every closed window.
    History,
}

impl View {
    /// Cycle to the next view.
    pub fn next(self) -> Self {
        match self {
            View::Live => View::History,
            View::History => View::Live,
        }
    }

    /// Cycle to the previous view.
    pub fn prev(self) -> Self {
        // Two views: previous and next coincide.
        self.next()
    }

    /// Returns the display label for this view.
    pub fn label(&self) -> &'static str {
        match self {
            View::Live => "Live",
            View::History => "History",
        }
    }
}

/// Fields shown for the running session. Reset when it ends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveState {
    pub bpm: Option<f32>,
    pub status: Option<StatusBand>,
    /// Last average reported by the firmware itself.
    pub device_average: Option<f32>,
    pub last_window: Option<(WindowResult, StatusBand)>,
    /// When the last reading arrived.
    pub last_reading_at: Option<Instant>,
}

/// Main application state.
pub struct App {
    pub running: bool,
    pub current_view: View,
    pub show_help: bool,

    monitor: Monitor,
    pub history: History,
    pub live: LiveState,

    pub connection: ConnectionState,
    pub connection_message: String,
    pub last_error: Option<String>,
    disconnect_requested: bool,

    // Navigation state (History view)
    pub selected_window_index: usize,

    // UI
    pub theme: Theme,

    // Status message (temporary feedback)
    pub status_message: Option<(String, Instant)>,
}

impl App {
    /// Create a new App driving the given monitor.
    pub fn new(monitor: Monitor) -> Self {
        Self::with_theme(monitor, Theme::auto_detect())
    }

    pub fn with_theme(monitor: Monitor, theme: Theme) -> Self {
        Self {
            running: true,
            current_view: View::Live,
            show_help: false,
            monitor,
            history: History::new(),
            live: LiveState::default(),
            connection: ConnectionState::Disconnected,
            connection_message: "Press c to connect".to_string(),
            last_error: None,
            disconnect_requested: false,
            selected_window_index: 0,
            theme,
            status_message: None,
        }
    }

    /// Returns a description of the device link.
    pub fn source_description(&self) -> String {
        format!(
            "{} ({})",
            self.monitor.target().address,
            self.monitor.transport_description()
        )
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    /// Set a temporary status message that will be shown for a few seconds.
    pub fn set_status_message(&mut self, message: String) {
        self.status_message = Some((message, Instant::now()));
    }

    /// Get the current status message if it hasn't expired.
    pub fn get_status_message(&self) -> Option<&str> {
        if let Some((msg, time)) = &self.status_message {
            if time.elapsed() < STATUS_MESSAGE_TTL {
                return Some(msg);
            }
        }
        None
    }

    /// Drain the monitor and apply its updates.
    ///
    /// Returns true if anything changed.
    pub fn poll_updates(&mut self) -> bool {
        let updates = self.monitor.pump();
        let changed = !updates.is_empty();
        for update in updates {
            self.apply_update(update);
        }
        changed
    }

    /// Apply one update from the monitor.
    pub fn apply_update(&mut self, update: Update) {
        match update {
            Update::Reading {
                value,
                status,
                device_average,
            } => {
                self.live.bpm = Some(value);
                self.live.status = Some(status);
                if device_average.is_some() {
                    self.live.device_average = device_average;
                }
                self.live.last_reading_at = Some(Instant::now());
                self.history.record_reading(value);
            }
            Update::Window { result, status } => {
                self.live.last_window = Some((result, status));
                self.history.record_window(result, status);
                self.set_status_message(format!(
                    "Minute saved: {:.1} BPM ({} samples)",
                    result.average, result.sample_count
                ));
            }
            Update::State { state, message } => {
                match state {
                    ConnectionState::Connected => self.last_error = None,
                    ConnectionState::Disconnected => {
                        // Anything the user did not ask for is an error.
                        if !std::mem::take(&mut self.disconnect_requested) {
                            self.last_error = Some(message.clone());
                        }
                    }
                    ConnectionState::Connecting => {}
                }
                self.connection = state;
                self.connection_message = message;
            }
            Update::Cleared => {
                self.live = LiveState::default();
                self.history.clear_readings();
            }
        }
    }

    /// Connect when idle, otherwise disconnect.
    pub fn toggle_connection(&mut self) {
        let result = match self.monitor.state() {
            ConnectionState::Disconnected => self.monitor.connect(),
            ConnectionState::Connecting | ConnectionState::Connected => {
                self.disconnect_requested = true;
                self.monitor.disconnect()
            }
        };
        if let Err(e) = result {
            self.set_status_message(e.to_string());
        }
        self.poll_updates();
    }

    /// Switch to the next view.
    pub fn next_view(&mut self) {
        self.current_view = self.current_view.next();
    }

    /// Switch to the previous view.
    pub fn prev_view(&mut self) {
        self.current_view = self.current_view.prev();
    }

    /// Switch to a specific view.
    pub fn set_view(&mut self, view: View) {
        self.current_view = view;
    }

    /// Move selection down by one row.
    pub fn select_next(&mut self) {
        self.select_next_n(1);
    }

    /// Move selection up by one row.
    pub fn select_prev(&mut self) {
        self.select_prev_n(1);
    }

    /// Move selection down by n rows.
    pub fn select_next_n(&mut self, n: usize) {
        if self.current_view == View::History {
            let max = self.history.windows.len().saturating_sub(1);
            self.selected_window_index = (self.selected_window_index + n).min(max);
        }
    }

    /// Move selection up by n rows.
    pub fn select_prev_n(&mut self, n: usize) {
        if self.current_view == View::History {
            self.selected_window_index = self.selected_window_index.saturating_sub(n);
        }
    }

    pub fn select_first(&mut self) {
        self.selected_window_index = 0;
    }

    pub fn select_last(&mut self) {
        self.selected_window_index = self.history.windows.len().saturating_sub(1);
    }

    /// Toggle the help overlay.
    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    /// Disconnect if needed and stop the main loop.
    pub fn quit(&mut self) {
        if self.monitor.state() != ConnectionState::Disconnected {
            self.disconnect_requested = true;
            let _ = self.monitor.disconnect();
            self.poll_updates();
        }
        self.running = false;
    }

    /// Write the closed windows of this run to a JSON file.
    pub fn export_history(&self, path: &Path) -> Result<()> {
        if self.history.windows.is_empty() {
            anyhow::bail!("No minute averages to export");
        }

        let windows: Vec<serde_json::Value> = self
            .history
            .windows
            .iter()
            .map(|p| {
                serde_json::json!({
                    "minute": p.minute,
                    "average": p.result.average,
                    "samples": p.result.sample_count,
                    "start": p.result.window_start.to_rfc3339(),
                    "end": p.result.window_end.to_rfc3339(),
                    "status": p.status.label(),
                })
            })
            .collect();

        let export = serde_json::json!({
            "device": self.monitor.target().address,
            "windows": windows,
        });

        let json = serde_json::to_string_pretty(&export)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;

    use crate::data::Thresholds;
    use crate::monitor::DeviceTarget;
    use crate::source::ReplayTransport;

    fn app() -> App {
        let monitor = Monitor::new(
            Arc::new(ReplayTransport::new(Duration::ZERO)),
            DeviceTarget::new("/nonexistent/capture.log"),
            Thresholds::default(),
            Duration::from_secs(60),
        );
        App::with_theme(monitor, Theme::dark())
    }

    fn window(average: f32) -> WindowResult {
        let now = Utc::now();
        WindowResult {
            average,
            sample_count: 12,
            window_start: now,
            window_end: now,
        }
    }

    #[test]
    fn test_view_cycle() {
        assert_eq!(View::Live.next(), View::History);
        assert_eq!(View::History.next(), View::Live);
        assert_eq!(View::Live.prev(), View::History);
    }

    #[test]
    fn test_reading_updates_live_fields() {
        let mut app = app();
        app.apply_update(Update::Reading {
            value: 72.0,
            status: StatusBand::Normal,
            device_average: Some(70.5),
        });
        app.apply_update(Update::Reading {
            value: 74.0,
            status: StatusBand::Normal,
            device_average: None,
        });

        assert_eq!(app.live.bpm, Some(74.0));
        assert_eq!(app.live.device_average, Some(70.5));
        assert_eq!(app.history.readings.len(), 2);
    }

    #[test]
    fn test_window_recorded_and_announced() {
        let mut app = app();
        app.apply_update(Update::Window {
            result: window(72.4),
            status: StatusBand::Normal,
        });

        assert_eq!(app.history.windows.len(), 1);
        assert!(app.get_status_message().unwrap().contains("72.4"));
    }

    #[test]
    fn test_cleared_resets_live_but_keeps_chart() {
        let mut app = app();
        app.apply_update(Update::Reading {
            value: 72.0,
            status: StatusBand::Normal,
            device_average: None,
        });
        app.apply_update(Update::Window {
            result: window(72.0),
            status: StatusBand::Normal,
        });
        app.apply_update(Update::Cleared);

        assert_eq!(app.live, LiveState::default());
        assert!(app.history.readings.is_empty());
        assert_eq!(app.history.windows.len(), 1);
    }

    #[test]
    fn test_involuntary_disconnect_sets_error() {
        let mut app = app();
        app.apply_update(Update::State {
            state: ConnectionState::Connected,
            message: "Connected".to_string(),
        });
        app.apply_update(Update::State {
            state: ConnectionState::Disconnected,
            message: "Connection lost: broken pipe".to_string(),
        });

        assert_eq!(app.connection, ConnectionState::Disconnected);
        assert_eq!(app.last_error.as_deref(), Some("Connection lost: broken pipe"));
    }

    #[test]
    fn test_failed_connect_via_toggle() {
        let mut app = app();
        app.toggle_connection();
        assert_ne!(app.connection, ConnectionState::Connected);

        // The capture file does not exist, so the handshake fails.
        let deadline = Instant::now() + Duration::from_secs(5);
        while app.last_error.is_none() && Instant::now() < deadline {
            app.poll_updates();
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(app.connection, ConnectionState::Disconnected);
        assert!(app.last_error.is_some());
    }

    #[test]
    fn test_history_selection_clamped() {
        let mut app = app();
        app.set_view(View::History);
        for avg in [60.0, 65.0, 70.0] {
            app.history.record_window(window(avg), StatusBand::Normal);
        }
        app.select_next_n(10);
        assert_eq!(app.selected_window_index, 2);
        app.select_prev_n(10);
        assert_eq!(app.selected_window_index, 0);
    }

    #[test]
    fn test_export_history() {
        let mut app = app();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        assert!(app.export_history(&path).is_err());

        app.history.record_window(window(81.0), StatusBand::Normal);
        app.export_history(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["windows"][0]["average"], 81.0);
        assert_eq!(json["windows"][0]["status"], "NORMAL");
    }

    #[test]
    fn test_quit_stops_loop() {
        let mut app = app();
        app.quit();
        assert!(!app.running);
    }
}
