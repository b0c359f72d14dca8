//! Data models and processing for the pulse stream.
//!
//! This module turns raw link bytes into classified readings and
//! minute averages, and keeps the history the dashboard draws from.
//!
//! ## Submodules
//!
//! - [`reading`]: Wire line parsing and chunk framing
//! - [`status`]: Status bands and thresholds
//! - [`window`]: The minute-window aggregator ([`StreamAggregator`])
//! - [`history`]: Bounded history for the sparkline and the averages chart
//! - [`duration`]: Parsing and formatting of duration strings (e.g., "60s", "1m")
//!
//! ## Data Flow
//!
//! ```text
//! link bytes
//!     │
//!     ▼
//! LineFramer ──▶ parse_line() ──▶ Reading
//!                                   │
//!                                   ├──▶ Thresholds::classify()  (every reading)
//!                                   │
//!                                   └──▶ WindowBuffer (value > noise floor)
//!                                            │  elapsed ≥ window
//!                                            ▼
//!                                       WindowResult
//! ```

pub mod duration;
pub mod history;
pub mod reading;
pub mod status;
pub mod window;

pub use history::{ChartPoint, History};
pub use reading::{parse_line, LineFramer, Reading};
pub use status::{StatusBand, Thresholds};
pub use window::{AggregatorEvent, StreamAggregator, WindowBuffer, WindowResult, DEFAULT_WINDOW};
