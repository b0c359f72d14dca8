//! Link abstraction for reaching the pulse device.
//!
//! A [`Transport`] opens a [`Link`] to a device address. The link's reader
//! is moved into a background worker that performs blocking reads. The
//! [`Handles`] stay with the session controller so the link can be torn
//! down from the owning thread.
//!
//! Implementations:
//!
//! - [`SerialTransport`]: a serial device such as the `/dev/rfcomm0` bound to an HC-05
//! - [`TcpTransport`]: a TCP bridge (`ser2net`, `socat`) relaying the same byte stream
//! - [`ReplayTransport`]: a capture file replayed at a fixed pace
//!
//! Before connecting, the controller consults a [`Capability`] gate.

mod replay;
mod serial;
mod tcp;
pub mod worker;

pub use replay::ReplayTransport;
pub use serial::{DeviceAccess, SerialTransport};
pub use tcp::TcpTransport;
pub use worker::{LinkEvent, StopSignal};

use std::fmt::Debug;
use std::io::{self, Read};

use clap::ValueEnum;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::TransportError;

/// Serial Port Profile service class, the service an HC-05 exposes.
pub const SERIAL_PORT_SERVICE: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805f9b34fb);

/// Which transport to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Serial,
    Tcp,
    Replay,
}

/// Opens links to a device.
pub trait Transport: Send + Sync + Debug {
    /// Perform the handshake. Blocks until the link is up or has failed.
    fn connect(&self, address: &str, service_id: Uuid) -> Result<Link, TransportError>;

    /// Human-readable description for the status bar.
    fn describe(&self) -> String;
}

/// A resource that can be released once.
pub trait Close: Send {
    fn close(&mut self) -> io::Result<()>;
}

/// An open link: a reader for the worker plus the handles to release it.
pub struct Link {
    pub reader: Box<dyn Read + Send>,
    pub handles: Handles,
}

impl Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link").field("handles", &self.handles).finish()
    }
}

/// Release handles for the three parts of a link.
#[derive(Default)]
pub struct Handles {
    pub input: Option<Box<dyn Close>>,
    pub output: Option<Box<dyn Close>>,
    pub socket: Option<Box<dyn Close>>,
}

impl Handles {
    pub fn new(input: Box<dyn Close>, output: Box<dyn Close>, socket: Box<dyn Close>) -> Self {
        Self {
            input: Some(input),
            output: Some(output),
            socket: Some(socket),
        }
    }

    /// Close input, output, then socket.
    ///
    /// Every handle is attempted even when an earlier one fails, and all
    /// of them are `None` afterwards. Failures are returned by name.
    pub fn close_all(&mut self) -> Vec<(&'static str, io::Error)> {
        let mut failures = Vec::new();
        for (name, slot) in [
            ("input", &mut self.input),
            ("output", &mut self.output),
            ("socket", &mut self.socket),
        ] {
            if let Some(mut handle) = slot.take() {
                if let Err(e) = handle.close() {
                    failures.push((name, e));
                }
            }
        }
        failures
    }

    /// Whether every handle has been released.
    pub fn is_released(&self) -> bool {
        self.input.is_none() && self.output.is_none() && self.socket.is_none()
    }
}

impl Debug for Handles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handles")
            .field("input", &self.input.is_some())
            .field("output", &self.output.is_some())
            .field("socket", &self.socket.is_some())
            .finish()
    }
}

/// Yes/no gate checked before a connection attempt.
pub trait Capability: Send {
    /// Whether access is currently granted.
    fn has_capability(&self) -> bool;

    /// Ask for access. Returns whether it is granted afterwards.
    fn request_capability(&mut self) -> bool;
}

/// Gate for transports that need no local permission.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysGranted;

impl Capability for AlwaysGranted {
    fn has_capability(&self) -> bool {
        true
    }

    fn request_capability(&mut self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    impl Close for Recorder {
        fn close(&mut self) -> io::Result<()> {
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                Err(io::Error::new(io::ErrorKind::Other, "boom"))
            } else {
                Ok(())
            }
        }
    }

    fn recorder(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>, fail: bool) -> Box<dyn Close> {
        Box::new(Recorder {
            name,
            log: log.clone(),
            fail,
        })
    }

    #[test]
    fn test_close_all_attempts_every_handle_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Handles::new(
            recorder("input", &log, true),
            recorder("output", &log, true),
            recorder("socket", &log, false),
        );

        let failures = handles.close_all();

        assert_eq!(*log.lock().unwrap(), vec!["input", "output", "socket"]);
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].0, "input");
        assert_eq!(failures[1].0, "output");
        assert!(handles.is_released());
    }

    #[test]
    fn test_close_all_is_idempotent() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Handles::new(
            recorder("input", &log, false),
            recorder("output", &log, false),
            recorder("socket", &log, false),
        );
        assert!(handles.close_all().is_empty());
        assert!(handles.close_all().is_empty());
        assert_eq!(log.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_spp_uuid() {
        assert_eq!(
            SERIAL_PORT_SERVICE.to_string(),
            "00001101-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_always_granted() {
        let mut gate = AlwaysGranted;
        assert!(gate.has_capability());
        assert!(gate.request_capability());
    }
}
