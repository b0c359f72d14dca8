//! Background threads that talk to the device.
//!
//! Workers only produce [`LinkEvent`]s. Every state change happens on the
//! thread that drains the channel.

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc;
use uuid::Uuid;

use super::{Link, Transport};
use crate::error::TransportError;

/// Size of the buffer handed to each blocking read.
pub const READ_BUFFER_SIZE: usize = 1024;

/// Sender side of the controller's event queue.
pub type EventSender = mpsc::UnboundedSender<LinkEvent>;

/// Something that happened on a link, tagged with its session.
#[derive(Debug)]
pub enum LinkEvent {
    /// The handshake finished.
    Connected { session: u64, link: Link },
    /// The handshake failed.
    ConnectFailed { session: u64, error: TransportError },
    /// Raw bytes from one read.
    Chunk { session: u64, bytes: Vec<u8> },
    /// The link broke while the session was live. Sent at most once.
    ReadFailed { session: u64, error: String },
}

/// Shared flag telling a reader its session is over.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Run the handshake on its own thread and report the outcome.
pub fn spawn_handshake(
    session: u64,
    transport: Arc<dyn Transport>,
    address: String,
    service_id: Uuid,
    tx: EventSender,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("pulsewatch-connect-{session}"))
        .spawn(move || {
            let event = match transport.connect(&address, service_id) {
                Ok(link) => LinkEvent::Connected { session, link },
                Err(error) => LinkEvent::ConnectFailed { session, error },
            };
            // Controller gone means nobody cares about this link any more.
            if let Err(mpsc::error::SendError(LinkEvent::Connected { mut link, .. })) =
                tx.send(event)
            {
                let _ = link.handles.close_all();
            }
        })
}

/// Start the blocking read loop for a session.
pub fn spawn_reader(
    session: u64,
    reader: Box<dyn Read + Send>,
    tx: EventSender,
    stop: StopSignal,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("pulsewatch-reader-{session}"))
        .spawn(move || read_loop(session, reader, tx, stop))
}

fn read_loop(session: u64, mut reader: Box<dyn Read + Send>, tx: EventSender, stop: StopSignal) {
    let mut buffer = [0u8; READ_BUFFER_SIZE];

    while !stop.is_stopped() {
        match reader.read(&mut buffer) {
            Ok(0) => {
                report_failure(session, "Connection closed".to_string(), &tx, &stop);
                break;
            }
            Ok(n) => {
                let chunk = LinkEvent::Chunk {
                    session,
                    bytes: buffer[..n].to_vec(),
                };
                if tx.send(chunk).is_err() {
                    // Receiver dropped
                    break;
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                continue;
            }
            Err(e) => {
                report_failure(session, e.to_string(), &tx, &stop);
                break;
            }
        }
    }

    tracing::debug!("Reader for session {} exited", session);
}

/// Errors after a stop request are the expected result of closing the link.
fn report_failure(session: u64, error: String, tx: &EventSender, stop: &StopSignal) {
    if stop.is_stopped() {
        return;
    }
    let _ = tx.send(LinkEvent::ReadFailed { session, error });
}
