// Library crate: public API items may not be used by the binary
#![allow(unused)]

//! # pulsewatch
//!
//! A terminal monitor for a heart-rate sensor streaming over a serial link
//! (typically an HC-05 Bluetooth module bound as `/dev/rfcomm0`).
//!
//! The device prints one `<ir>,<bpm>[,<avg>]` line per sample. pulsewatch
//! classifies every reading, averages the readings of each minute, draws
//! them, and hands every minute average to a store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Application                          │
//! │  ┌─────────┐    ┌──────────┐    ┌─────────┐    ┌──────────┐  │
//! │  │  app    │◀───│ monitor  │───▶│  store  │    │    ui    │  │
//! │  │ (state) │    │ (session)│    │(persist)│    │(ratatui) │  │
//! │  └────┬────┘    └────┬─────┘    └─────────┘    └──────────┘  │
//! │       │              │ LinkEvent queue                       │
//! │       ▼              ▼                                       │
//! │  ┌─────────┐    ┌─────────┐                                  │
//! │  │  data   │    │ source  │◀── Serial | Tcp | Replay         │
//! │  │(windows)│    │ (link)  │                                  │
//! │  └─────────┘    └─────────┘                                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`source`]**: Link abstraction ([`Transport`] trait) with serial, TCP
//!   and capture-replay implementations, plus the background read worker
//! - **[`data`]**: Line parsing, status bands, the minute-window
//!   [`StreamAggregator`], and history for the chart
//! - **[`monitor`]**: The connect/listen/disconnect state machine ([`Monitor`])
//! - **[`store`]**: Persistence of minute averages ([`Store`] trait)
//! - **[`config`]**: Layered settings (file, environment, flags)
//! - **[`ui`]**: Terminal rendering using ratatui
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # HC-05 bound with `rfcomm bind 0 <mac>`
//! pulsewatch --address /dev/rfcomm0
//!
//! # Replay a capture without hardware
//! pulsewatch --transport replay --address pulse.log --autoconnect
//! ```
//!
//! ### As a library
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use pulsewatch::{DeviceTarget, Monitor, SerialTransport, Thresholds, Update};
//!
//! let mut monitor = Monitor::new(
//!     Arc::new(SerialTransport::new(4800)),
//!     DeviceTarget::new("/dev/rfcomm0"),
//!     Thresholds::default(),
//!     Duration::from_secs(60),
//! );
//! monitor.connect().unwrap();
//!
//! loop {
//!     for update in monitor.pump() {
//!         if let Update::Window { result, status } = update {
//!             println!("{:.1} BPM ({})", result.average, status.label());
//!         }
//!     }
//!     std::thread::sleep(Duration::from_millis(100));
//! }
//! ```

pub mod app;
pub mod config;
pub mod data;
pub mod error;
pub mod events;
pub mod monitor;
pub mod source;
pub mod store;
pub mod ui;

// Re-export main types for convenience
pub use app::App;
pub use config::Settings;
pub use data::{Reading, StatusBand, StreamAggregator, Thresholds, WindowResult};
pub use error::{LineError, MonitorError, StoreError, TransportError};
pub use monitor::{ConnectionState, DeviceTarget, Monitor, Update};
pub use source::{ReplayTransport, SerialTransport, TcpTransport, Transport};
pub use store::{HealthRecord, JsonlStore, NullStore, RestStore, Store};
