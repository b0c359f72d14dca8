//! Persistence of closed windows.
//!
//! Each non-empty window becomes a [`HealthRecord`] keyed by a fresh UUID.
//! Saves are fire-and-forget: the monitor logs a failure and moves on.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use clap::ValueEnum;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use uuid::Uuid;

use crate::data::WindowResult;
use crate::error::StoreError;

/// Default document collection for the REST store.
pub const DEFAULT_COLLECTION: &str = "HealthData";

/// The persisted form of one window average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    /// Epoch milliseconds of the window close, as a string.
    pub timestamp: String,
    pub avg_bpm: f32,
    /// Local wall-clock time, `yyyy-MM-dd HH:mm:ss`.
    pub date: String,
}

impl HealthRecord {
    pub fn from_window(result: &WindowResult) -> Self {
        Self {
            timestamp: result.window_end.timestamp_millis().to_string(),
            avg_bpm: result.average,
            date: result
                .window_end
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
        }
    }
}

/// Somewhere to put window records.
pub trait Store: Send {
    fn save(&self, id: Uuid, record: &HealthRecord) -> Result<(), StoreError>;

    fn describe(&self) -> String;
}

/// Which store to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    None,
    Jsonl,
    Rest,
}

/// Discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

impl Store for NullStore {
    fn save(&self, _id: Uuid, _record: &HealthRecord) -> Result<(), StoreError> {
        Ok(())
    }

    fn describe(&self) -> String {
        "not saved".to_string()
    }
}

/// Appends one JSON object per line: `{"id": .., "record": ..}`.
#[derive(Debug, Clone)]
pub struct JsonlStore {
    path: PathBuf,
}

#[derive(Serialize)]
struct JsonlEntry<'a> {
    id: Uuid,
    record: &'a HealthRecord,
}

impl JsonlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Store for JsonlStore {
    fn save(&self, id: Uuid, record: &HealthRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(&JsonlEntry { id, record })?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// Document store reachable over HTTP.
///
/// Records are written with `PUT {base_url}/{collection}/{id}.json`, the
/// Firebase Realtime Database REST layout. The request runs on the given
/// runtime and its outcome is only logged.
#[derive(Debug, Clone)]
pub struct RestStore {
    client: Client,
    base_url: String,
    collection: String,
    runtime: Handle,
}

impl RestStore {
    pub fn builder() -> RestStoreBuilder {
        RestStoreBuilder::default()
    }

    /// Where a record with this id is written.
    pub fn record_url(&self, id: Uuid) -> String {
        format!("{}/{}/{}.json", self.base_url, self.collection, id)
    }
}

impl Store for RestStore {
    fn save(&self, id: Uuid, record: &HealthRecord) -> Result<(), StoreError> {
        let url = self.record_url(id);
        let body = serde_json::to_value(record)?;
        let client = self.client.clone();

        self.runtime.spawn(async move {
            match client.put(&url).json(&body).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!("Stored record {}", id);
                }
                Ok(response) => {
                    tracing::warn!("Store rejected record {}: HTTP {}", id, response.status());
                }
                Err(e) => {
                    tracing::warn!("Failed to store record {}: {}", id, e);
                }
            }
        });
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.base_url, self.collection)
    }
}

/// Builder for [`RestStore`].
#[derive(Debug, Default)]
pub struct RestStoreBuilder {
    base_url: Option<String>,
    collection: Option<String>,
    timeout: Option<Duration>,
}

impl RestStoreBuilder {
    /// Database root, e.g. `https://example.firebaseio.com`.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Collection name (default: "HealthData").
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Request timeout (default: 10 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the store. Requests are spawned on `runtime`.
    pub fn build(self, runtime: Handle) -> Result<RestStore, StoreError> {
        let base_url = self
            .base_url
            .ok_or_else(|| StoreError::Http("no store URL configured".to_string()))?;
        let client = Client::builder()
            .timeout(self.timeout.unwrap_or(Duration::from_secs(10)))
            .build()?;

        Ok(RestStore {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: self
                .collection
                .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            runtime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn window() -> WindowResult {
        let end = Utc.timestamp_millis_opt(1_700_000_060_000).unwrap();
        WindowResult {
            average: 62.5,
            sample_count: 4,
            window_start: end - chrono::TimeDelta::seconds(60),
            window_end: end,
        }
    }

    #[test]
    fn test_record_from_window() {
        let record = HealthRecord::from_window(&window());
        assert_eq!(record.timestamp, "1700000060000");
        assert_eq!(record.avg_bpm, 62.5);
        assert_eq!(record.date.len(), "2023-11-14 22:14:20".len());
    }

    #[test]
    fn test_record_field_names() {
        let json = serde_json::to_value(HealthRecord::from_window(&window())).unwrap();
        let obj = json.as_object().unwrap();
        assert!(obj.contains_key("timestamp"));
        assert!(obj.contains_key("avgBpm"));
        assert!(obj.contains_key("date"));
    }

    #[test]
    fn test_jsonl_store_appends() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(dir.path().join("health.jsonl"));
        let record = HealthRecord::from_window(&window());

        let first = Uuid::new_v4();
        store.save(first, &record).unwrap();
        store.save(Uuid::new_v4(), &record).unwrap();

        let content = std::fs::read_to_string(store.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let entry: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(entry["id"], first.to_string());
        assert_eq!(entry["record"]["avgBpm"], 62.5);
    }

    #[test]
    fn test_jsonl_store_unwritable_path() {
        let store = JsonlStore::new("/nonexistent/dir/health.jsonl");
        let err = store
            .save(Uuid::new_v4(), &HealthRecord::from_window(&window()))
            .unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }

    #[test]
    fn test_rest_store_url_layout() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let store = RestStore::builder()
            .base_url("https://pulse.example.com/")
            .build(runtime.handle().clone())
            .unwrap();

        let id = Uuid::nil();
        assert_eq!(
            store.record_url(id),
            "https://pulse.example.com/HealthData/00000000-0000-0000-0000-000000000000.json"
        );
        assert_eq!(store.describe(), "https://pulse.example.com/HealthData");
    }

    #[test]
    fn test_rest_store_requires_url() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let err = RestStore::builder().build(runtime.handle().clone()).unwrap_err();
        assert!(matches!(err, StoreError::Http(_)));
    }

    #[test]
    fn test_null_store() {
        assert!(NullStore
            .save(Uuid::new_v4(), &HealthRecord::from_window(&window()))
            .is_ok());
    }
}
