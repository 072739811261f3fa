//! Library data model and the persisted index document.
//!
//! The index is one JSON document holding every imported source, every
//! indexed item, and the set of known tag names. Items are keyed by their
//! absolute path under case-insensitive comparison; [`normalize_path_key`]
//! produces the canonical lookup key.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use log::warn;

use crate::storage::write_atomically;

const INDEX_SCHEMA_VERSION: u32 = 1;

/// Canonical case-insensitive lookup key for an item path.
///
/// Backslashes are folded to forward slashes so indexes written on one
/// platform keep resolving on another.
pub fn normalize_path_key(path: &str) -> String {
    path.replace('\\', "/").to_lowercase()
}

/// Coarse media classification driving which scans apply to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Photo,
}

/// An imported root folder tracked in the library.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Source {
    pub id: String,
    pub root_path: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_true")]
    pub is_enabled: bool,
}

/// One indexed media file with its metadata.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct MediaItem {
    pub source_id: String,
    pub full_path: String,
    pub relative_path: String,
    pub file_name: String,
    pub media_kind: MediaKind,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub is_blacklisted: bool,
    #[serde(default)]
    pub play_count: u32,
    #[serde(default)]
    pub last_played_unix_ms: Option<i64>,
    #[serde(default)]
    pub duration_secs: Option<u32>,
    #[serde(default)]
    pub has_audio: Option<bool>,
    #[serde(default)]
    pub integrated_loudness_db: Option<f64>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl MediaItem {
    /// Canonical lookup key for this item.
    pub fn path_key(&self) -> String {
        normalize_path_key(&self.full_path)
    }
}

/// The aggregate of all sources, items, and known tag names.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LibraryIndex {
    schema_version: u32,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub items: Vec<MediaItem>,
    #[serde(default)]
    pub known_tags: BTreeSet<String>,
}

impl Default for LibraryIndex {
    fn default() -> Self {
        Self {
            schema_version: INDEX_SCHEMA_VERSION,
            sources: Vec::new(),
            items: Vec::new(),
            known_tags: BTreeSet::new(),
        }
    }
}

impl LibraryIndex {
    pub fn load(path: &Path) -> Self {
        let Ok(contents) = fs::read_to_string(path) else {
            return Self::default();
        };
        let parsed: Self = match serde_json::from_str(&contents) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(
                    "Failed parsing library index at {}: {}",
                    path.display(),
                    err
                );
                return Self::default();
            }
        };
        if parsed.schema_version != INDEX_SCHEMA_VERSION {
            warn!(
                "Unsupported library index schema {} at {}. Starting empty.",
                parsed.schema_version,
                path.display()
            );
            return Self::default();
        }
        parsed
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let serialized = serde_json::to_string_pretty(self)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string()))?;
        write_atomically(path, &serialized)
    }

    pub fn source_by_id(&self, source_id: &str) -> Option<&Source> {
        self.sources.iter().find(|source| source.id == source_id)
    }

    pub fn source_by_id_mut(&mut self, source_id: &str) -> Option<&mut Source> {
        self.sources
            .iter_mut()
            .find(|source| source.id == source_id)
    }

    /// Finds a source whose root matches `root_path` case-insensitively.
    pub fn source_by_root(&self, root_path: &str) -> Option<&Source> {
        let key = normalize_path_key(root_path);
        self.sources
            .iter()
            .find(|source| normalize_path_key(&source.root_path) == key)
    }

    pub fn find_item(&self, path: &str) -> Option<&MediaItem> {
        let key = normalize_path_key(path);
        self.items.iter().find(|item| item.path_key() == key)
    }

    pub fn find_item_mut(&mut self, path: &str) -> Option<&mut MediaItem> {
        let key = normalize_path_key(path);
        self.items.iter_mut().find(|item| item.path_key() == key)
    }

    /// Removes a source and every item referencing it. Returns the number
    /// of items removed.
    pub fn remove_source_cascade(&mut self, source_id: &str) -> usize {
        self.sources.retain(|source| source.id != source_id);
        let before = self.items.len();
        self.items.retain(|item| item.source_id != source_id);
        before - self.items.len()
    }
}

pub(crate) fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_item(source_id: &str, full_path: &str) -> MediaItem {
        MediaItem {
            source_id: source_id.to_string(),
            full_path: full_path.to_string(),
            relative_path: full_path.rsplit('/').next().unwrap_or(full_path).to_string(),
            file_name: full_path.rsplit('/').next().unwrap_or(full_path).to_string(),
            media_kind: MediaKind::Video,
            is_favorite: false,
            is_blacklisted: false,
            play_count: 0,
            last_played_unix_ms: None,
            duration_secs: None,
            has_audio: None,
            integrated_loudness_db: None,
            tags: BTreeSet::new(),
        }
    }

    #[test]
    fn test_path_keys_compare_case_insensitively() {
        assert_eq!(
            normalize_path_key("/Media/Clips/A.MP4"),
            normalize_path_key("/media/clips/a.mp4")
        );
        assert_eq!(
            normalize_path_key(r"C:\Media\clip.mp4"),
            normalize_path_key("c:/media/CLIP.mp4")
        );
    }

    #[test]
    fn test_index_roundtrip() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("library.json");

        let mut index = LibraryIndex::default();
        index.sources.push(Source {
            id: "src-1".to_string(),
            root_path: "/media".to_string(),
            display_name: Some("Media".to_string()),
            is_enabled: true,
        });
        index.items.push(sample_item("src-1", "/media/a.mp4"));
        index.known_tags.insert("family".to_string());
        index.save(&path).expect("save");

        let loaded = LibraryIndex::load(&path);
        assert_eq!(loaded, index);
    }

    #[test]
    fn test_corrupt_index_loads_empty() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("library.json");
        fs::write(&path, "{not valid json").expect("write corrupt file");

        let loaded = LibraryIndex::load(&path);
        assert!(loaded.sources.is_empty());
        assert!(loaded.items.is_empty());
    }

    #[test]
    fn test_remove_source_cascades_to_items() {
        let mut index = LibraryIndex::default();
        index.sources.push(Source {
            id: "src-1".to_string(),
            root_path: "/media".to_string(),
            display_name: None,
            is_enabled: true,
        });
        index.items.push(sample_item("src-1", "/media/a.mp4"));
        index.items.push(sample_item("src-1", "/media/b.mp4"));
        index.items.push(sample_item("src-2", "/other/c.mp4"));

        let removed = index.remove_source_cascade("src-1");
        assert_eq!(removed, 2);
        assert!(index.source_by_id("src-1").is_none());
        assert!(index.items.iter().all(|item| item.source_id != "src-1"));
    }
}
