//! Duration and loudness cache services.
//!
//! Each cache owns a path-keyed map behind its own mutex and persists to a
//! schema-versioned JSON document. Keys compare case-insensitively.
//! Callers only see the synchronized accessors, never the map itself.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::warn;

use crate::library_index::normalize_path_key;
use crate::storage::write_atomically;

const CACHE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
struct DurationEntry {
    path: String,
    duration_secs: u32,
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
struct DurationCacheFile {
    schema_version: u32,
    entries: Vec<DurationEntry>,
}

impl Default for DurationCacheFile {
    fn default() -> Self {
        Self {
            schema_version: CACHE_SCHEMA_VERSION,
            entries: Vec::new(),
        }
    }
}

/// Mean and peak level reported by the loudness probe, in dB.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LoudnessMeasurement {
    pub mean_volume_db: f64,
    pub peak_db: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
struct LoudnessEntry {
    path: String,
    #[serde(flatten)]
    measurement: LoudnessMeasurement,
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
struct LoudnessCacheFile {
    schema_version: u32,
    entries: Vec<LoudnessEntry>,
}

impl Default for LoudnessCacheFile {
    fn default() -> Self {
        Self {
            schema_version: CACHE_SCHEMA_VERSION,
            entries: Vec::new(),
        }
    }
}

fn load_cache_file<T: Default + serde::de::DeserializeOwned>(path: &Path) -> T {
    let Ok(contents) = fs::read_to_string(path) else {
        return T::default();
    };
    match serde_json::from_str(&contents) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!("Failed parsing cache at {}: {}", path.display(), err);
            T::default()
        }
    }
}

/// Path → whole-second duration cache.
pub struct DurationCache {
    entries: Mutex<HashMap<String, DurationEntry>>,
    file_path: PathBuf,
}

impl DurationCache {
    pub fn open(file_path: impl Into<PathBuf>) -> Self {
        let file_path = file_path.into();
        let file: DurationCacheFile = load_cache_file(&file_path);
        let valid = file.schema_version == CACHE_SCHEMA_VERSION;
        let entries = file
            .entries
            .into_iter()
            .filter(|_| valid)
            .map(|entry| (normalize_path_key(&entry.path), entry))
            .collect();
        Self {
            entries: Mutex::new(entries),
            file_path,
        }
    }

    pub fn get(&self, path: &str) -> Option<u32> {
        self.lock()
            .get(&normalize_path_key(path))
            .map(|entry| entry.duration_secs)
    }

    pub fn insert(&self, path: &str, duration_secs: u32) {
        self.lock().insert(
            normalize_path_key(path),
            DurationEntry {
                path: path.to_string(),
                duration_secs,
            },
        );
    }

    pub fn remove(&self, path: &str) {
        self.lock().remove(&normalize_path_key(path));
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Normalized keys of every cached path, for scan partitioning.
    pub fn snapshot_keys(&self) -> HashSet<String> {
        self.lock().keys().cloned().collect()
    }

    /// Persists the cache. Serialization happens on a snapshot so the map
    /// mutex is not held across disk I/O.
    pub fn save(&self) -> std::io::Result<()> {
        let mut entries: Vec<DurationEntry> = self.lock().values().cloned().collect();
        entries.sort_by(|left, right| left.path.cmp(&right.path));
        let file = DurationCacheFile {
            schema_version: CACHE_SCHEMA_VERSION,
            entries,
        };
        let serialized = serde_json::to_string_pretty(&file)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string()))?;
        write_atomically(&self.file_path, &serialized)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, DurationEntry>> {
        self.entries
            .lock()
            .expect("duration cache mutex should not be poisoned")
    }
}

/// Path → loudness measurement cache.
pub struct LoudnessCache {
    entries: Mutex<HashMap<String, LoudnessEntry>>,
    file_path: PathBuf,
}

impl LoudnessCache {
    pub fn open(file_path: impl Into<PathBuf>) -> Self {
        let file_path = file_path.into();
        let file: LoudnessCacheFile = load_cache_file(&file_path);
        let valid = file.schema_version == CACHE_SCHEMA_VERSION;
        let entries = file
            .entries
            .into_iter()
            .filter(|_| valid)
            .map(|entry| (normalize_path_key(&entry.path), entry))
            .collect();
        Self {
            entries: Mutex::new(entries),
            file_path,
        }
    }

    pub fn get(&self, path: &str) -> Option<LoudnessMeasurement> {
        self.lock()
            .get(&normalize_path_key(path))
            .map(|entry| entry.measurement)
    }

    pub fn insert(&self, path: &str, measurement: LoudnessMeasurement) {
        self.lock().insert(
            normalize_path_key(path),
            LoudnessEntry {
                path: path.to_string(),
                measurement,
            },
        );
    }

    pub fn remove(&self, path: &str) {
        self.lock().remove(&normalize_path_key(path));
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn snapshot_keys(&self) -> HashSet<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn save(&self) -> std::io::Result<()> {
        let mut entries: Vec<LoudnessEntry> = self.lock().values().cloned().collect();
        entries.sort_by(|left, right| left.path.cmp(&right.path));
        let file = LoudnessCacheFile {
            schema_version: CACHE_SCHEMA_VERSION,
            entries,
        };
        let serialized = serde_json::to_string_pretty(&file)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string()))?;
        write_atomically(&self.file_path, &serialized)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, LoudnessEntry>> {
        self.entries
            .lock()
            .expect("loudness cache mutex should not be poisoned")
    }
}
