//! Serial device transport.
//!
//! On Linux an HC-05 is usually bound with `rfcomm bind 0 <mac>`, which
//! exposes the SPP channel as `/dev/rfcomm0`. Any USB serial adapter that
//! relays the same line format works too.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serialport::SerialPort;
use uuid::Uuid;

use super::{Capability, Close, Handles, Link, Transport, SERIAL_PORT_SERVICE};
use crate::error::TransportError;

/// How long a single read waits before the worker re-checks its stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Opens serial devices at a fixed baud rate.
#[derive(Debug, Clone)]
pub struct SerialTransport {
    baud_rate: u32,
}

impl SerialTransport {
    pub fn new(baud_rate: u32) -> Self {
        Self { baud_rate }
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

impl Transport for SerialTransport {
    fn connect(&self, address: &str, service_id: Uuid) -> Result<Link, TransportError> {
        if service_id != SERIAL_PORT_SERVICE {
            tracing::warn!(
                "Service {} requested; serial devices only carry SPP, continuing",
                service_id
            );
        }

        let port = open_port(address, self.baud_rate).map_err(|e| TransportError::Connect {
            address: address.to_string(),
            reason: e.to_string(),
        })?;

        let reader = port.try_clone()?;
        let output = port.try_clone()?;
        let input = port.try_clone()?;

        tracing::info!("Opened {} at {} baud", address, self.baud_rate);

        Ok(Link {
            reader: Box::new(PortReader(reader)),
            handles: Handles::new(
                Box::new(PortHandle::new(input, false)),
                Box::new(PortHandle::new(output, true)),
                Box::new(PortHandle::new(port, false)),
            ),
        })
    }

    fn describe(&self) -> String {
        format!("serial @ {} baud", self.baud_rate)
    }
}

/// Open the port without the exclusive lock.
///
/// Teardown only drops the handle clones. The worker's reader clone keeps
/// its descriptor until its current poll returns, so an exclusive port
/// would refuse a reconnect made inside that interval.
#[cfg(unix)]
fn open_port(address: &str, baud_rate: u32) -> serialport::Result<Box<dyn SerialPort>> {
    let mut port = serialport::new(address, baud_rate)
        .timeout(POLL_INTERVAL)
        .open_native()?;
    port.set_exclusive(false)?;
    Ok(Box::new(port))
}

#[cfg(not(unix))]
fn open_port(address: &str, baud_rate: u32) -> serialport::Result<Box<dyn SerialPort>> {
    serialport::new(address, baud_rate)
        .timeout(POLL_INTERVAL)
        .open()
}

struct PortReader(Box<dyn SerialPort>);

impl Read for PortReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

/// One clone of an open port. Closing drops the clone's descriptor.
struct PortHandle {
    port: Option<Box<dyn SerialPort>>,
    flush: bool,
}

impl PortHandle {
    fn new(port: Box<dyn SerialPort>, flush: bool) -> Self {
        Self {
            port: Some(port),
            flush,
        }
    }
}

impl Close for PortHandle {
    fn close(&mut self) -> io::Result<()> {
        match self.port.take() {
            Some(mut port) if self.flush => port.flush(),
            _ => Ok(()),
        }
    }
}

/// Permission gate for a device node.
///
/// There is no prompt to show on a desktop, so a request only logs a hint
/// and re-checks.
#[derive(Debug, Clone)]
pub struct DeviceAccess {
    path: PathBuf,
}

impl DeviceAccess {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Capability for DeviceAccess {
    fn has_capability(&self) -> bool {
        match open_device(&self.path) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Cannot open {}: {}", self.path.display(), e);
                false
            }
        }
    }

    fn request_capability(&mut self) -> bool {
        if !self.path.exists() {
            tracing::warn!(
                "{} does not exist; bind the module first (e.g. `rfcomm bind 0 <address>`)",
                self.path.display()
            );
        } else if self.path.is_dir() {
            tracing::warn!("{} is a directory, not a device", self.path.display());
        } else {
            tracing::warn!(
                "{} cannot be opened for reading and writing; add your user to the device's group (often `dialout`)",
                self.path.display()
            );
        }
        self.has_capability()
    }
}

/// Open the node the way the transport will, without waiting for carrier
/// or taking it as the controlling terminal. The handle is dropped at once.
#[cfg(unix)]
fn open_device(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NONBLOCK | libc::O_NOCTTY)
        .open(path)
}

#[cfg(not(unix))]
fn open_device(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).write(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_access_missing_path() {
        let mut gate = DeviceAccess::new("/nonexistent/rfcomm99");
        assert!(!gate.has_capability());
        assert!(!gate.request_capability());
    }

    #[test]
    fn test_device_access_writable_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let gate = DeviceAccess::new(file.path());
        assert!(gate.has_capability());
    }

    #[test]
    fn test_device_access_refuses_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut gate = DeviceAccess::new(dir.path());
        assert!(!gate.has_capability());
        assert!(!gate.request_capability());
        assert!(SerialTransport::new(4800)
            .connect(&dir.path().to_string_lossy(), SERIAL_PORT_SERVICE)
            .is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_reconnect_while_old_reader_is_open() {
        let (_master, slave) = serialport::TTYPort::pair().unwrap();
        let name = slave.name().unwrap();
        drop(slave);

        let transport = SerialTransport::new(4800);
        let mut first = transport.connect(&name, SERIAL_PORT_SERVICE).unwrap();
        first.handles.close_all();
        assert!(first.handles.is_released());

        // first.reader is still held, as by a worker inside its poll
        let second = transport.connect(&name, SERIAL_PORT_SERVICE);
        assert!(second.is_ok(), "{:?}", second.err());
    }

    #[test]
    fn test_connect_missing_device_fails() {
        let transport = SerialTransport::new(9600);
        let err = transport
            .connect("/nonexistent/ttyPULSE", SERIAL_PORT_SERVICE)
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
        assert!(err.to_string().contains("/nonexistent/ttyPULSE"));
    }

    #[test]
    fn test_describe() {
        assert_eq!(SerialTransport::new(4800).describe(), "serial @ 4800 baud");
    }
}
