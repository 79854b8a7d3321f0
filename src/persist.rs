use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{json, Value};

use crate::data::LocationRecord;

/// Backend collaborator: location data source plus marker persistence.
/// A trait so tests can inject an in-memory double.
pub trait Backend: Send + Sync {
    /// Ordered location records for a map. Fetched once at startup.
    fn fetch_locations(&self, map_name: &str) -> Result<Vec<LocationRecord>>;

    /// The stored marker mapping for a map.
    fn fetch_markers(&self, map_name: &str) -> Result<HashMap<String, String>>;

    /// Persist the full marker mapping (not a delta).
    fn save_markers(&self, map_name: &str, markers: &HashMap<String, String>) -> Result<()>;
}

/// HTTP backend client.
pub struct HttpBackend {
    client: reqwest::blocking::Client,
    base: String,
}

impl HttpBackend {
    pub fn new(base: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        })
    }
}

impl Backend for HttpBackend {
    fn fetch_locations(&self, map_name: &str) -> Result<Vec<LocationRecord>> {
        let url = format!("{}/get_tiles/{map_name}", self.base);
        let mut bytes = self
            .client
            .get(&url)
            .send()?
            .error_for_status()?
            .bytes()?
            .to_vec();
        let records = simd_json::serde::from_slice(&mut bytes)
            .with_context(|| format!("parse locations from {url}"))?;
        Ok(records)
    }

    fn fetch_markers(&self, map_name: &str) -> Result<HashMap<String, String>> {
        let url = format!("{}/get_markers/{map_name}", self.base);
        let value: Value = self
            .client
            .get(&url)
            .send()?
            .error_for_status()?
            .json()
            .with_context(|| format!("parse markers from {url}"))?;
        Ok(markers_from_value(value))
    }

    fn save_markers(&self, map_name: &str, markers: &HashMap<String, String>) -> Result<()> {
        let url = format!("{}/save_markers/", self.base);
        let body = json!({ "map_name": map_name, "markers": markers });
        self.client
            .post(&url)
            .json(&body)
            .send()?
            .error_for_status()
            .with_context(|| format!("save markers to {url}"))?;
        Ok(())
    }
}

/// Interpret a markers response body. The backend answers with an
/// empty JSON array instead of an object when the user has no stored
/// row, so any non-object body maps to "no markers". Non-string values
/// inside an object are dropped.
pub(crate) fn markers_from_value(value: Value) -> HashMap<String, String> {
    match value {
        Value::Object(map) => map
            .into_iter()
            .filter_map(|(k, v)| match v {
                Value::String(color) => Some((k, color)),
                _ => None,
            })
            .collect(),
        _ => HashMap::new(),
    }
}

/// Dispatch a save on a detached thread: the caller never waits for or
/// learns about the outcome beyond a log line. The in-memory store
/// stays authoritative either way.
pub fn save_detached(backend: Arc<dyn Backend>, map_name: String, markers: HashMap<String, String>) {
    thread::spawn(move || {
        if let Err(err) = backend.save_markers(&map_name, &markers) {
            log::warn!("saving {} markers for {map_name} failed: {err:#}", markers.len());
        } else {
            log::debug!("saved {} markers for {map_name}", markers.len());
        }
    });
}
