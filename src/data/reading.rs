//! Wire line parsing.
//!
//! The device prints one line per sample:
//!
//! ```text
//! <ir>,<bpm>[,<device_avg>]\n
//! ```
//!
//! Only the BPM field drives any state. The leading field only has to be
//! present, and the trailing device average is kept for display.

use crate::error::LineError;

/// Longest partial line carried between chunks before it is discarded.
const MAX_PARTIAL_LINE: usize = 1024;

/// A single parsed sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Instantaneous pulse in BPM.
    pub bpm: f32,
    /// Running average computed by the firmware, if it sent one.
    pub device_average: Option<f32>,
}

/// Parse one wire line into a reading.
pub fn parse_line(line: &str) -> Result<Reading, LineError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(LineError::Empty);
    }

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < 2 {
        return Err(LineError::TooFewFields(fields.len()));
    }

    let bpm: f32 = fields[1]
        .parse()
        .map_err(|_| LineError::NotNumeric(fields[1].to_string()))?;
    if !bpm.is_finite() {
        return Err(LineError::NotNumeric(fields[1].to_string()));
    }

    let device_average = fields.get(2).and_then(|f| f.parse::<f32>().ok());

    Ok(Reading {
        bpm,
        device_average,
    })
}

/// Splits a chunked byte stream into complete lines.
///
/// A line split across two reads is reassembled. Whatever follows the last
/// newline of a chunk is held until the next chunk arrives. A line that grows
/// past [`MAX_PARTIAL_LINE`] is dropped up to and including its terminator.
#[derive(Debug, Default)]
pub struct LineFramer {
    partial: Vec<u8>,
    /// Set after an overlong line was cut; cleared at its newline.
    skipping: bool,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for piece in chunk.split_inclusive(|&b| b == b'\n') {
            let terminated = piece.ends_with(b"\n");

            if self.skipping {
                self.skipping = !terminated;
                continue;
            }

            self.partial.extend_from_slice(piece);
            if terminated {
                self.partial.pop();
                if self.partial.len() > MAX_PARTIAL_LINE {
                    tracing::debug!("Dropping {} byte line", self.partial.len());
                } else {
                    lines.push(String::from_utf8_lossy(&self.partial).into_owned());
                }
                self.partial.clear();
            } else if self.partial.len() > MAX_PARTIAL_LINE {
                tracing::debug!(
                    "Discarding {} bytes without a line terminator",
                    self.partial.len()
                );
                self.partial.clear();
                self.skipping = true;
            }
        }

        lines
    }

    /// Bytes waiting for a terminator.
    pub fn pending(&self) -> usize {
        self.partial.len()
    }

    pub fn clear(&mut self) {
        self.partial.clear();
        self.skipping = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_line() {
        let r = parse_line("51234,72.5,70").unwrap();
        assert_eq!(r.bpm, 72.5);
        assert_eq!(r.device_average, Some(70.0));
    }

    #[test]
    fn test_parse_two_fields_with_whitespace() {
        let r = parse_line("  512 , 45.0 \r").unwrap();
        assert_eq!(r.bpm, 45.0);
        assert_eq!(r.device_average, None);
    }

    #[test]
    fn test_parse_ignores_bad_device_average() {
        let r = parse_line("512,88,n/a").unwrap();
        assert_eq!(r.bpm, 88.0);
        assert_eq!(r.device_average, None);
    }

    #[test]
    fn test_parse_rejects_non_numeric_bpm() {
        assert_eq!(
            parse_line("bad,data"),
            Err(LineError::NotNumeric("data".to_string()))
        );
        assert!(parse_line("512,NaN").is_err());
    }

    #[test]
    fn test_parse_rejects_short_lines() {
        assert_eq!(parse_line("START"), Err(LineError::TooFewFields(1)));
        assert_eq!(parse_line("   "), Err(LineError::Empty));
    }

    #[test]
    fn test_framer_splits_lines() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"512,45.0\n512,47.0\r\n\n");
        assert_eq!(lines, vec!["512,45.0", "512,47.0\r", ""]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_framer_reassembles_across_chunks() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"512,4").is_empty());
        assert_eq!(framer.pending(), 5);
        let lines = framer.push(b"5.0\n512,");
        assert_eq!(lines, vec!["512,45.0"]);
        let lines = framer.push(b"96.0\n");
        assert_eq!(lines, vec!["512,96.0"]);
    }

    #[test]
    fn test_framer_drops_runaway_partial() {
        let mut framer = LineFramer::new();
        let junk = vec![b'x'; MAX_PARTIAL_LINE + 1];
        assert!(framer.push(&junk).is_empty());
        assert_eq!(framer.pending(), 0);
        // The rest of the runaway line must not surface as a reading
        assert_eq!(framer.push(b"x,55\n1,60\n"), vec!["1,60"]);
    }

    #[test]
    fn test_framer_skips_runaway_tail_across_chunks() {
        let mut framer = LineFramer::new();
        assert!(framer.push(&vec![b'x'; MAX_PARTIAL_LINE + 1]).is_empty());
        assert!(framer.push(b"xxxx").is_empty());
        assert_eq!(framer.pending(), 0);
        assert!(framer.push(b"x,55").is_empty());
        assert_eq!(framer.push(b"\n512,61\n"), vec!["512,61"]);
    }

    #[test]
    fn test_framer_drops_overlong_terminated_line() {
        let mut framer = LineFramer::new();
        let mut chunk = vec![b'9'; MAX_PARTIAL_LINE];
        chunk.extend_from_slice(b",70\n1,62\n");
        assert_eq!(framer.push(&chunk), vec!["1,62"]);
    }

    #[test]
    fn test_framer_clear_stops_skipping() {
        let mut framer = LineFramer::new();
        framer.push(&vec![b'x'; MAX_PARTIAL_LINE + 1]);
        framer.clear();
        assert_eq!(framer.push(b"1,58\n"), vec!["1,58"]);
    }
}
