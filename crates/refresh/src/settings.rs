//! Runtime settings (refresh interval, alert threshold, display preferences).

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use common::Error;
use dashmap::DashMap;
use tracing::{debug, warn};

pub const REFRESH_INTERVAL: &str = "refresh_interval";
pub const AQI_ALERT_THRESHOLD: &str = "aqi_alert_threshold";

/// Values every fresh store starts with.
pub const DEFAULT_SETTINGS: [(&str, &str); 7] = [
    ("theme", "light"),
    (REFRESH_INTERVAL, "300"),
    ("map_type", "markers"),
    ("default_country", ""),
    ("notifications_enabled", "true"),
    (AQI_ALERT_THRESHOLD, "150"),
    ("language", "en"),
];

pub trait SettingsStore: Send + Sync {
    fn get_setting(&self, key: &str) -> Option<String>;
    fn set_setting(&self, key: &str, value: &str) -> Result<(), Error>;
}

/// Setting parsed as `T`; `fallback` when absent or unparsable.
pub fn parsed_setting<T: FromStr>(store: &dyn SettingsStore, key: &str, fallback: T) -> T {
    match store.get_setting(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Setting {}={:?} is not valid, using default", key, raw);
            fallback
        }),
        None => fallback,
    }
}

fn defaults() -> BTreeMap<String, String> {
    DEFAULT_SETTINGS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// ── In-memory store ───────────────────────────────────────────────────

#[derive(Debug)]
pub struct MemorySettingsStore {
    values: DashMap<String, String>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self {
            values: defaults().into_iter().collect(),
        }
    }
}

impl Default for MemorySettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get_setting(&self, key: &str) -> Option<String> {
        self.values.get(key).map(|v| v.value().clone())
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<(), Error> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ── JSON file store ───────────────────────────────────────────────────

/// Settings persisted as one flat JSON object. Every write rewrites the file.
#[derive(Debug)]
pub struct FileSettingsStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileSettingsStore {
    /// Open `path`, creating it with the defaults if it does not exist.
    /// Keys missing from an existing file are filled from the defaults.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let mut values = defaults();

        match fs::read_to_string(&path) {
            Ok(contents) => {
                let stored: BTreeMap<String, String> = serde_json::from_str(&contents)
                    .map_err(|e| Error::Config(format!("invalid settings file {}: {}", path.display(), e)))?;
                debug!("Loaded {} settings from {}", stored.len(), path.display());
                values.extend(stored);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No settings file at {}, writing defaults", path.display());
                persist(&path, &values)?;
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn persist(path: &Path, values: &BTreeMap<String, String>) -> Result<(), Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(values)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl SettingsStore for FileSettingsStore {
    fn get_setting(&self, key: &str) -> Option<String> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.get(key).cloned()
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<(), Error> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        persist(&self.path, &values)
    }
}
