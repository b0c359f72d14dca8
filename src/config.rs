//! Layered settings.
//!
//! Built-in defaults, then an optional TOML file, then `PULSEWATCH_*`
//! environment variables (`__` separates sections, e.g.
//! `PULSEWATCH_DEVICE__ADDRESS=/dev/rfcomm1`). Command-line flags are
//! applied on top by the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use uuid::Uuid;

use crate::data::duration::parse_duration;
use crate::data::Thresholds;
use crate::source::{TransportKind, SERIAL_PORT_SERVICE};
use crate::store::{StoreKind, DEFAULT_COLLECTION};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "PULSEWATCH";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub device: DeviceSettings,
    pub aggregation: AggregationSettings,
    pub store: StoreSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    pub transport: TransportKind,
    /// Device path, `host:port`, or capture file, depending on the transport.
    pub address: String,
    pub service_id: Uuid,
    pub baud_rate: u32,
    /// Delay between replayed chunks.
    pub replay_pace: String,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            transport: TransportKind::Serial,
            address: "/dev/rfcomm0".to_string(),
            service_id: SERIAL_PORT_SERVICE,
            baud_rate: 4800,
            replay_pace: "50ms".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregationSettings {
    /// Window length as a duration string ("60s", "1m").
    pub window: String,
    pub noise_floor: f32,
    pub low_bpm: f32,
    pub high_bpm: f32,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        let thresholds = Thresholds::default();
        Self {
            window: "60s".to_string(),
            noise_floor: thresholds.noise_floor,
            low_bpm: thresholds.low_bpm,
            high_bpm: thresholds.high_bpm,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub kind: StoreKind,
    /// File for the `jsonl` store.
    pub path: PathBuf,
    /// Database root for the `rest` store.
    pub url: Option<String>,
    pub collection: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            kind: StoreKind::None,
            path: PathBuf::from("health.jsonl"),
            url: None,
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }
}

impl Settings {
    /// Load defaults, the optional file, and the environment, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings = Self::load_layers(path)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load without validating, so callers can apply overrides first.
    pub fn load_layers(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Check values that deserialize fine but make no sense together.
    pub fn validate(&self) -> Result<()> {
        let a = &self.aggregation;
        if a.low_bpm > a.high_bpm {
            bail!(
                "low_bpm ({}) must not exceed high_bpm ({})",
                a.low_bpm,
                a.high_bpm
            );
        }
        if self.window()?.is_zero() {
            bail!("Aggregation window must be longer than zero");
        }
        self.replay_pace()?;
        if self.store.kind == StoreKind::Rest && self.store.url.is_none() {
            bail!("store.url is required for the rest store");
        }
        Ok(())
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            low_bpm: self.aggregation.low_bpm,
            high_bpm: self.aggregation.high_bpm,
            noise_floor: self.aggregation.noise_floor,
        }
    }

    pub fn window(&self) -> Result<Duration> {
        parse_duration(&self.aggregation.window)
            .with_context(|| format!("Invalid window {:?}", self.aggregation.window))
    }

    pub fn replay_pace(&self) -> Result<Duration> {
        parse_duration(&self.device.replay_pace)
            .with_context(|| format!("Invalid replay pace {:?}", self.device.replay_pace))
    }
}
