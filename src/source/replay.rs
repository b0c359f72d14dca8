//! Capture-file transport.
//!
//! Replays a recorded byte stream (for example `cat /dev/rfcomm0 > pulse.log`)
//! in fixed-size chunks. The end of the file looks like the device going away.

use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use super::{Close, Handles, Link, Transport};
use crate::error::TransportError;

/// Default bytes per replayed read.
const DEFAULT_CHUNK: usize = 16;

/// Replays capture files. The `address` passed to `connect` is the file path.
#[derive(Debug, Clone)]
pub struct ReplayTransport {
    pace: Duration,
    chunk_size: usize,
}

impl ReplayTransport {
    /// Create a replay transport that sleeps `pace` before each chunk.
    pub fn new(pace: Duration) -> Self {
        Self {
            pace,
            chunk_size: DEFAULT_CHUNK,
        }
    }

    /// Override the chunk size (minimum 1 byte).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

impl Transport for ReplayTransport {
    fn connect(&self, address: &str, _service_id: Uuid) -> Result<Link, TransportError> {
        let path = PathBuf::from(address);
        let data = std::fs::read(&path).map_err(|e| TransportError::Connect {
            address: address.to_string(),
            reason: e.to_string(),
        })?;
        tracing::info!("Replaying {} bytes from {}", data.len(), path.display());

        let closed = Arc::new(AtomicBool::new(false));
        let reader = PacedReader {
            data,
            position: 0,
            chunk_size: self.chunk_size,
            pace: self.pace,
            closed: closed.clone(),
        };

        Ok(Link {
            reader: Box::new(reader),
            handles: Handles::new(
                Box::new(FlagHandle(closed.clone())),
                Box::new(FlagHandle(closed.clone())),
                Box::new(FlagHandle(closed)),
            ),
        })
    }

    fn describe(&self) -> String {
        format!("replay @ {}ms/chunk", self.pace.as_millis())
    }
}

struct PacedReader {
    data: Vec<u8>,
    position: usize,
    chunk_size: usize,
    pace: Duration,
    closed: Arc<AtomicBool>,
}

impl Read for PacedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.pace.is_zero() {
            std::thread::sleep(self.pace);
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::ConnectionAborted, "Replay closed"));
        }

        let remaining = &self.data[self.position..];
        let n = remaining.len().min(self.chunk_size).min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.position += n;
        Ok(n)
    }
}

struct FlagHandle(Arc<AtomicBool>);

impl Close for FlagHandle {
    fn close(&mut self) -> io::Result<()> {
        self.0.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    use crate::source::SERIAL_PORT_SERVICE;

    fn capture(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_replay_yields_chunks_then_eof() {
        let file = capture(b"512,45.0\n512,47.0\n");
        let transport = ReplayTransport::new(Duration::ZERO).with_chunk_size(10);
        let mut link = transport
            .connect(file.path().to_str().unwrap(), SERIAL_PORT_SERVICE)
            .unwrap();

        let mut buf = [0u8; 64];
        let mut collected = Vec::new();
        loop {
            let n = link.reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            assert!(n <= 10);
            collected.extend_from_slice(&buf[..n]);
        }
        assert_eq!(collected, b"512,45.0\n512,47.0\n");
    }

    #[test]
    fn test_closing_aborts_reads() {
        let file = capture(b"512,45.0\n");
        let mut link = ReplayTransport::new(Duration::ZERO)
            .connect(file.path().to_str().unwrap(), SERIAL_PORT_SERVICE)
            .unwrap();

        assert!(link.handles.close_all().is_empty());
        let mut buf = [0u8; 8];
        let err = link.reader.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionAborted);
    }

    #[test]
    fn test_missing_capture() {
        let err = ReplayTransport::new(Duration::ZERO)
            .connect("/nonexistent/pulse.log", SERIAL_PORT_SERVICE)
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }
}
