//! Error types for the link, the store, and the session controller.

use std::io;

use thiserror::Error;

/// Why a wire line was not turned into a reading.
///
/// These never leave the aggregator: malformed lines are dropped and only
/// counted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    /// Blank line (or only whitespace).
    #[error("empty line")]
    Empty,

    /// Fewer than two comma-separated fields.
    #[error("expected at least 2 fields, found {0}")]
    TooFewFields(usize),

    /// Field 1 is not a number.
    #[error("bpm field is not numeric: {0:?}")]
    NotNumeric(String),
}

/// Errors raised by a transport while opening or using a link.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The handshake with the device failed.
    #[error("Connection to {address} failed: {reason}")]
    Connect { address: String, reason: String },

    /// I/O failure on an open link.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The transport cannot serve the requested address.
    #[error("Unsupported address: {0}")]
    Unsupported(String),
}

impl From<serialport::Error> for TransportError {
    fn from(err: serialport::Error) -> Self {
        TransportError::Io(io::Error::from(err))
    }
}

/// Errors raised while persisting a window record.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Http(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Http(err.to_string())
    }
}

/// Errors returned by lifecycle requests on the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    /// A session is already connecting or connected.
    #[error("A session is already active; disconnect first")]
    AlreadyActive,

    /// The capability gate refused access to the device.
    #[error("Permission to access the device was not granted")]
    PermissionDenied,

    /// Disconnect was requested with no active session.
    #[error("Not connected")]
    NotConnected,

    /// The handshake thread could not be started.
    #[error("Could not start connection: {0}")]
    Spawn(String),
}
