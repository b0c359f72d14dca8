//! Pulse classification into status bands.
//!
//! The same thresholds apply to instantaneous readings and to minute
//! averages.

use serde::{Deserialize, Serialize};

/// Thresholds for band classification and noise filtering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Values strictly below this are `Low`.
    pub low_bpm: f32,
    /// Values strictly above this are `High`.
    pub high_bpm: f32,
    /// Readings at or below this never enter a window.
    pub noise_floor: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low_bpm: 50.0,
            high_bpm: 100.0,
            noise_floor: 30.0,
        }
    }
}

impl Thresholds {
    /// Classify a BPM value.
    pub fn classify(&self, bpm: f32) -> StatusBand {
        if bpm < self.low_bpm {
            StatusBand::Low
        } else if bpm > self.high_bpm {
            StatusBand::High
        } else {
            StatusBand::Normal
        }
    }

    /// Whether a reading is plausible enough to be averaged.
    pub fn accepts(&self, bpm: f32) -> bool {
        bpm > self.noise_floor
    }
}

/// Status band of a pulse value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusBand {
    Low,
    Normal,
    High,
}

impl StatusBand {
    /// Short label for display.
    pub fn label(&self) -> &'static str {
        match self {
            StatusBand::Low => "LOW",
            StatusBand::Normal => "NORMAL",
            StatusBand::High => "HIGH",
        }
    }

    /// Longer advice line shown next to the band.
    pub fn advice(&self) -> &'static str {
        match self {
            StatusBand::Low => "Low pulse",
            StatusBand::Normal => "Normal",
            StatusBand::High => "High pulse",
        }
    }

    pub fn is_normal(&self) -> bool {
        *self == StatusBand::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_bands() {
        let t = Thresholds::default();
        assert_eq!(t.classify(20.0), StatusBand::Low);
        assert_eq!(t.classify(49.9), StatusBand::Low);
        assert_eq!(t.classify(50.0), StatusBand::Normal);
        assert_eq!(t.classify(72.0), StatusBand::Normal);
        assert_eq!(t.classify(100.0), StatusBand::Normal);
        assert_eq!(t.classify(100.5), StatusBand::High);
        assert_eq!(t.classify(180.0), StatusBand::High);
    }

    #[test]
    fn test_noise_floor_is_exclusive() {
        let t = Thresholds::default();
        assert!(!t.accepts(20.0));
        assert!(!t.accepts(30.0));
        assert!(t.accepts(30.1));
    }

    #[test]
    fn test_custom_thresholds() {
        let t = Thresholds {
            low_bpm: 40.0,
            high_bpm: 160.0,
            noise_floor: 25.0,
        };
        assert_eq!(t.classify(45.0), StatusBand::Normal);
        assert_eq!(t.classify(150.0), StatusBand::Normal);
        assert_eq!(t.classify(161.0), StatusBand::High);
        assert!(t.accepts(26.0));
    }
}
