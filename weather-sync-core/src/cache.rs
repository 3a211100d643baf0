//! On-disk cache holding the raw responses of one (city, window) fetch.
//!
//! A file's presence is the only freshness signal: its content is never
//! validated and it never expires.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::model::Window;

/// One cached upstream response, flattened to a CSV record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPayload {
    #[serde(rename = "City")]
    pub city: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub timezone: Option<String>,
    pub timezone_offset: Option<i64>,
    /// JSON text of the upstream `data` list.
    pub data: String,
}

impl CachedPayload {
    /// Flatten a tagged response body; `data` is kept as JSON text.
    pub fn from_body(body: &Value) -> Self {
        Self {
            city: body["City"].as_str().unwrap_or_default().to_string(),
            lat: body["lat"].as_f64(),
            lon: body["lon"].as_f64(),
            timezone: body["timezone"].as_str().map(str::to_string),
            timezone_offset: body["timezone_offset"].as_i64(),
            data: match &body["data"] {
                Value::Null => "[]".to_string(),
                other => other.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct WindowCache {
    folder: PathBuf,
}

impl WindowCache {
    pub fn new<P: Into<PathBuf>>(folder: P) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    /// `<folder>/<city>_<start>_<end>.csv`
    pub fn path_for(&self, city: &str, window: Window) -> PathBuf {
        self.folder
            .join(format!("{city}_{}_{}.csv", window.start, window.end))
    }

    pub fn contains(&self, city: &str, window: Window) -> bool {
        self.path_for(city, window).exists()
    }

    /// Write `bodies` to the cache file of (city, window), creating the folder
    /// if needed. An existing file is left untouched.
    pub fn store(&self, city: &str, window: Window, bodies: &[Value]) -> Result<PathBuf> {
        let path = self.path_for(city, window);
        if path.exists() {
            return Ok(path);
        }

        fs::create_dir_all(&self.folder).with_context(|| {
            format!("Failed to create data folder: {}", self.folder.display())
        })?;

        write_payloads(&path, bodies.iter().map(CachedPayload::from_body))?;
        tracing::info!(path = %path.display(), rows = bodies.len(), "data saved");
        Ok(path)
    }

    pub fn load(&self, city: &str, window: Window) -> Result<Vec<CachedPayload>> {
        read_payloads(&self.path_for(city, window))
    }
}

fn write_payloads(path: &Path, payloads: impl Iterator<Item = CachedPayload>) -> Result<()> {
    // Header is written explicitly so an empty fetch still yields a readable file.
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to create cache file: {}", path.display()))?;

    wtr.write_record(["City", "lat", "lon", "timezone", "timezone_offset", "data"])?;
    for payload in payloads {
        wtr.serialize(payload)?;
    }
    wtr.flush()
        .with_context(|| format!("Failed to write cache file: {}", path.display()))?;
    Ok(())
}

fn read_payloads(path: &Path) -> Result<Vec<CachedPayload>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open cache file: {}", path.display()))?;

    rdr.deserialize::<CachedPayload>()
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read cache file: {}", path.display()))
}
