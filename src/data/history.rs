//! Historical data tracking for the sparkline and the averages chart.

use std::collections::VecDeque;

use super::status::StatusBand;
use super::window::WindowResult;

/// Maximum number of live readings kept for the sparkline.
const MAX_READINGS: usize = 60;

/// Maximum number of minute averages kept for the chart and history table.
const MAX_WINDOWS: usize = 240;

/// One plotted minute average.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartPoint {
    /// Sequential minute index, starting at 1 for the first window.
    pub minute: f64,
    pub result: WindowResult,
    pub status: StatusBand,
}

/// Tracks recent readings and emitted windows.
#[derive(Debug, Clone, Default)]
pub struct History {
    /// Most recent instantaneous readings, oldest first.
    pub readings: VecDeque<f32>,
    /// Emitted windows, oldest first.
    pub windows: VecDeque<ChartPoint>,
    minute_counter: u64,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an instantaneous reading.
    pub fn record_reading(&mut self, bpm: f32) {
        self.readings.push_back(bpm);
        if self.readings.len() > MAX_READINGS {
            self.readings.pop_front();
        }
    }

    /// Record a closed window and assign it the next minute index.
    pub fn record_window(&mut self, result: WindowResult, status: StatusBand) {
        self.minute_counter += 1;
        self.windows.push_back(ChartPoint {
            minute: self.minute_counter as f64,
            result,
            status,
        });
        if self.windows.len() > MAX_WINDOWS {
            self.windows.pop_front();
        }
    }

    /// Drop the live readings. Chart data survives reconnects.
    pub fn clear_readings(&mut self) {
        self.readings.clear();
    }

    /// `(minute, average)` pairs for a line chart.
    pub fn chart_points(&self) -> Vec<(f64, f64)> {
        self.windows
            .iter()
            .map(|p| (p.minute, p.result.average as f64))
            .collect()
    }

    /// Y bounds for the chart, padded and never narrower than 20 BPM.
    pub fn chart_bounds(&self) -> [f64; 2] {
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        for p in &self.windows {
            min = min.min(p.result.average as f64);
            max = max.max(p.result.average as f64);
        }
        if min > max {
            return [40.0, 120.0];
        }
        let mid = (min + max) / 2.0;
        let half = ((max - min) / 2.0 + 5.0).max(10.0);
        [(mid - half).max(0.0).floor(), (mid + half).ceil()]
    }

    /// X bounds covering every plotted minute.
    pub fn chart_x_bounds(&self) -> [f64; 2] {
        match (self.windows.front(), self.windows.back()) {
            (Some(first), Some(last)) => [first.minute, last.minute.max(first.minute + 1.0)],
            _ => [0.0, 1.0],
        }
    }

    /// Sparkline data for live readings (normalized to 0-7 for 8 bar levels).
    ///
    /// Returns an empty Vec if there's not enough history.
    pub fn readings_sparkline(&self) -> Vec<u8> {
        if self.readings.len() < 2 {
            return Vec::new();
        }

        let max = self.readings.iter().copied().fold(f32::MIN, f32::max);
        let min = self.readings.iter().copied().fold(f32::MAX, f32::min);
        let range = (max - min).max(1.0);

        self.readings
            .iter()
            .map(|&v| {
                let normalized = ((v - min) / range * 7.0) as u8;
                normalized.min(7)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn result(average: f32) -> WindowResult {
        let t = DateTime::from_timestamp_millis(0).unwrap();
        WindowResult {
            average,
            sample_count: 10,
            window_start: t,
            window_end: t,
        }
    }

    #[test]
    fn test_minute_counter_increments() {
        let mut history = History::new();
        history.record_window(result(70.0), StatusBand::Normal);
        history.record_window(result(75.0), StatusBand::Normal);

        assert_eq!(history.chart_points(), vec![(1.0, 70.0), (2.0, 75.0)]);
        assert_eq!(history.chart_x_bounds(), [1.0, 2.0]);
    }

    #[test]
    fn test_readings_are_bounded() {
        let mut history = History::new();
        for i in 0..(MAX_READINGS + 5) {
            history.record_reading(i as f32);
        }
        assert_eq!(history.readings.len(), MAX_READINGS);
        assert_eq!(history.readings.front(), Some(&5.0));
    }

    #[test]
    fn test_sparkline_normalization() {
        let mut history = History::new();
        assert!(history.readings_sparkline().is_empty());

        history.record_reading(60.0);
        history.record_reading(74.0);
        history.record_reading(67.0);
        assert_eq!(history.readings_sparkline(), vec![0, 7, 3]);
    }

    #[test]
    fn test_chart_bounds() {
        let mut history = History::new();
        assert_eq!(history.chart_bounds(), [40.0, 120.0]);

        history.record_window(result(70.0), StatusBand::Normal);
        let [lo, hi] = history.chart_bounds();
        assert!(lo <= 60.0 && hi >= 80.0);
    }

    #[test]
    fn test_clear_readings_keeps_windows() {
        let mut history = History::new();
        history.record_reading(70.0);
        history.record_window(result(70.0), StatusBand::Normal);
        history.clear_readings();
        assert!(history.readings.is_empty());
        assert_eq!(history.windows.len(), 1);
    }
}
