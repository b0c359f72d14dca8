//! Minute-windowed aggregation of the pulse stream.
//!
//! Turns raw chunks into instantaneous readings and, once per window, an
//! averaged [`WindowResult`].
//!
//! ## Window rules
//!
//! - Only readings above the noise floor are buffered. Every parsed reading
//!   is still classified and reported.
//! - The boundary is time-based. It is checked once per parsed line, so a
//!   quiet link closes its window on the first line after the deadline.
//! - Closing an empty window emits nothing but still re-arms the timer.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::reading::{parse_line, LineFramer, Reading};
use super::status::{StatusBand, Thresholds};
use crate::error::LineError;

/// Default averaging window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// The averaged outcome of one closed window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowResult {
    pub average: f32,
    pub sample_count: usize,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

/// Readings accepted since the last flush.
#[derive(Debug, Clone, Default)]
pub struct WindowBuffer {
    samples: Vec<f32>,
}

impl WindowBuffer {
    pub fn push(&mut self, bpm: f32) {
        self.samples.push(bpm);
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Arithmetic mean, or `None` when empty.
    pub fn mean(&self) -> Option<f32> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: f32 = self.samples.iter().sum();
        Some(sum / self.samples.len() as f32)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Something the aggregator wants shown or stored.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregatorEvent {
    /// A parsed line, whether or not it passed the noise filter.
    Reading { reading: Reading, status: StatusBand },
    /// A closed, non-empty window.
    Window {
        result: WindowResult,
        status: StatusBand,
    },
}

/// Turns the raw byte stream into readings and minute averages.
#[derive(Debug)]
pub struct StreamAggregator {
    thresholds: Thresholds,
    window: TimeDelta,
    buffer: WindowBuffer,
    window_start: DateTime<Utc>,
    framer: LineFramer,
    dropped_lines: u64,
}

impl StreamAggregator {
    /// Create an aggregator whose first window starts at `now`.
    pub fn new(thresholds: Thresholds, window: Duration, now: DateTime<Utc>) -> Self {
        let window = TimeDelta::from_std(window).unwrap_or(TimeDelta::seconds(60));
        Self {
            thresholds,
            window,
            buffer: WindowBuffer::default(),
            window_start: now,
            framer: LineFramer::new(),
            dropped_lines: 0,
        }
    }

    /// Forget everything from the previous session and start a new window.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.buffer.clear();
        self.framer.clear();
        self.window_start = now;
    }

    /// Feed one chunk from the link.
    ///
    /// Events come back in line order. A line's reading event always
    /// precedes the window event that line triggers.
    pub fn ingest(&mut self, chunk: &[u8], now: DateTime<Utc>) -> Vec<AggregatorEvent> {
        let mut events = Vec::new();
        for line in self.framer.push(chunk) {
            events.extend(self.ingest_line(&line, now));
        }
        events
    }

    /// Process a single line that has already been framed.
    pub fn ingest_line(&mut self, line: &str, now: DateTime<Utc>) -> Vec<AggregatorEvent> {
        let reading = match parse_line(line) {
            Ok(reading) => reading,
            Err(LineError::Empty) => return Vec::new(),
            Err(e) => {
                self.dropped_lines += 1;
                tracing::trace!("Dropped line {:?}: {}", line, e);
                return Vec::new();
            }
        };

        let mut events = vec![AggregatorEvent::Reading {
            reading,
            status: self.thresholds.classify(reading.bpm),
        }];

        if self.thresholds.accepts(reading.bpm) {
            self.buffer.push(reading.bpm);
        }

        if now.signed_duration_since(self.window_start) >= self.window {
            if let Some(result) = self.close_window(now) {
                events.push(AggregatorEvent::Window {
                    result,
                    status: self.thresholds.classify(result.average),
                });
            }
        }

        events
    }

    /// Close the current window at `now`.
    ///
    /// The timer is re-armed even when the buffer is empty.
    pub fn close_window(&mut self, now: DateTime<Utc>) -> Option<WindowResult> {
        let window_start = std::mem::replace(&mut self.window_start, now);
        let average = self.buffer.mean()?;
        let result = WindowResult {
            average,
            sample_count: self.buffer.len(),
            window_start,
            window_end: now,
        };
        self.buffer.clear();
        tracing::debug!(
            "Window closed: {:.1} BPM over {} samples",
            result.average,
            result.sample_count
        );
        Some(result)
    }

    pub fn buffer(&self) -> &WindowBuffer {
        &self.buffer
    }

    pub fn window_start(&self) -> DateTime<Utc> {
        self.window_start
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Malformed lines seen since this aggregator was created.
    pub fn dropped_lines(&self) -> u64 {
        self.dropped_lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    fn at(ms: i64) -> DateTime<Utc> {
        t0() + TimeDelta::milliseconds(ms)
    }

    fn aggregator() -> StreamAggregator {
        StreamAggregator::new(Thresholds::default(), DEFAULT_WINDOW, t0())
    }

    fn windows(events: &[AggregatorEvent]) -> Vec<(WindowResult, StatusBand)> {
        events
            .iter()
            .filter_map(|e| match e {
                AggregatorEvent::Window { result, status } => Some((*result, *status)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_readings_within_window_are_buffered() {
        let mut agg = aggregator();
        let events = agg.ingest(b"512,45.0\n512,47.0\n512,96.0\n", at(1_000));

        assert_eq!(events.len(), 3);
        assert_eq!(agg.buffer().samples(), &[45.0, 47.0, 96.0]);
        assert!(windows(&events).is_empty());
    }

    #[test]
    fn test_window_average_and_band() {
        let mut agg = aggregator();
        agg.ingest(b"512,45.0\n512,47.0\n", at(10_000));
        let events = agg.ingest(b"512,96.0\n", at(60_000));

        let closed = windows(&events);
        assert_eq!(closed.len(), 1);
        let (result, status) = closed[0];
        assert!((result.average - 62.666_67).abs() < 0.01);
        assert_eq!(result.sample_count, 3);
        assert_eq!(result.window_start, t0());
        assert_eq!(result.window_end, at(60_000));
        assert_eq!(status, StatusBand::Normal);
        assert!(agg.buffer().is_empty());
        assert_eq!(agg.window_start(), at(60_000));
    }

    #[test]
    fn test_noise_reading_reported_but_not_buffered() {
        let mut agg = aggregator();
        let events = agg.ingest(b"512,20.0\n", at(500));

        assert_eq!(
            events,
            vec![AggregatorEvent::Reading {
                reading: Reading {
                    bpm: 20.0,
                    device_average: None
                },
                status: StatusBand::Low,
            }]
        );
        assert!(agg.buffer().is_empty());
    }

    #[test]
    fn test_malformed_line_ignored() {
        let mut agg = aggregator();
        let events = agg.ingest(b"bad,data\nSTOP\n", at(70_000));

        assert!(events.is_empty());
        assert!(agg.buffer().is_empty());
        assert_eq!(agg.dropped_lines(), 2);
        // Malformed lines never trigger the time check.
        assert_eq!(agg.window_start(), t0());
    }

    #[test]
    fn test_empty_window_rearms_silently() {
        let mut agg = aggregator();
        let events = agg.ingest(b"512,12.0\n", at(61_000));

        assert!(windows(&events).is_empty());
        assert_eq!(agg.window_start(), at(61_000));

        // Next window is measured from the re-arm point.
        agg.ingest(b"512,80.0\n", at(100_000));
        let events = agg.ingest(b"512,90.0\n", at(121_000));
        let closed = windows(&events);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].0.average, 85.0);
        assert_eq!(closed[0].0.window_start, at(61_000));
    }

    #[test]
    fn test_sparse_stream_single_sample_window() {
        let mut agg = aggregator();
        let events = agg.ingest(b"1,130\n", at(300_000));

        let closed = windows(&events);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].0.sample_count, 1);
        assert_eq!(closed[0].1, StatusBand::High);
    }

    #[test]
    fn test_reading_precedes_window_event() {
        let mut agg = aggregator();
        agg.ingest(b"1,70\n", at(1_000));
        let events = agg.ingest(b"1,40\n", at(60_000));

        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            AggregatorEvent::Reading {
                status: StatusBand::Low,
                ..
            }
        ));
        assert!(matches!(events[1], AggregatorEvent::Window { .. }));
    }

    #[test]
    fn test_reset_clears_previous_session() {
        let mut agg = aggregator();
        agg.ingest(b"1,70\n1,7", at(1_000));
        assert_eq!(agg.buffer().len(), 1);

        agg.reset(at(30_000));
        assert!(agg.buffer().is_empty());
        assert_eq!(agg.window_start(), at(30_000));

        // The half line from the old session must not glue onto new data.
        let events = agg.ingest(b"5\n1,65\n", at(31_000));
        assert_eq!(events.len(), 1);
        assert_eq!(agg.buffer().samples(), &[65.0]);
    }

    #[test]
    fn test_close_window_directly() {
        let mut agg = aggregator();
        assert!(agg.close_window(at(5_000)).is_none());
        assert_eq!(agg.window_start(), at(5_000));
    }
}
