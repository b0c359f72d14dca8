//! TCP bridge transport.
//!
//! Useful when the serial device lives on another machine and is exposed
//! with `ser2net` or `socat TCP-LISTEN:<port> /dev/rfcomm0`.

use std::io;
use std::net::{Shutdown, TcpStream};

use uuid::Uuid;

use super::{Close, Handles, Link, Transport};
use crate::error::TransportError;

/// Connects to `host:port` endpoints.
#[derive(Debug, Clone, Default)]
pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for TcpTransport {
    fn connect(&self, address: &str, _service_id: Uuid) -> Result<Link, TransportError> {
        if !address.contains(':') {
            return Err(TransportError::Unsupported(format!(
                "{} (expected host:port)",
                address
            )));
        }

        let stream = TcpStream::connect(address).map_err(|e| TransportError::Connect {
            address: address.to_string(),
            reason: e.to_string(),
        })?;
        tracing::info!("Connected to {}", address);

        let reader = stream.try_clone()?;
        let input = stream.try_clone()?;
        let output = stream.try_clone()?;

        Ok(Link {
            reader: Box::new(reader),
            handles: Handles::new(
                Box::new(StreamHandle::new(input, Shutdown::Read)),
                Box::new(StreamHandle::new(output, Shutdown::Write)),
                Box::new(StreamHandle::new(stream, Shutdown::Both)),
            ),
        })
    }

    fn describe(&self) -> String {
        "tcp".to_string()
    }
}

/// Shuts down one direction of the socket, which wakes a blocked reader.
struct StreamHandle {
    stream: Option<TcpStream>,
    how: Shutdown,
}

impl StreamHandle {
    fn new(stream: TcpStream, how: Shutdown) -> Self {
        Self {
            stream: Some(stream),
            how,
        }
    }
}

impl Close for StreamHandle {
    fn close(&mut self) -> io::Result<()> {
        match self.stream.take() {
            Some(stream) => match stream.shutdown(self.how) {
                // Already torn down by the peer.
                Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
                other => other,
            },
            None => Ok(()),
        }
    }
}
