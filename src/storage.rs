//! On-disk storage layout and document persistence primitives.
//!
//! Every persisted document goes through [`write_atomically`]: content is
//! staged into a temporary sibling file and renamed over the previous
//! document, so a crash mid-write never truncates existing state.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use toml_edit::{DocumentMut, Item, Table};

/// Resolves the file locations of every persisted document.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl StoragePaths {
    /// Storage rooted in the per-user data directory.
    pub fn from_system() -> Self {
        let root = dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("shufflebox");
        Self { root }
    }

    /// Storage rooted at an explicit directory (tests, portable installs).
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn library_file(&self) -> PathBuf {
        self.root.join("library.json")
    }

    pub fn duration_cache_file(&self) -> PathBuf {
        self.root.join("duration_cache.json")
    }

    pub fn loudness_cache_file(&self) -> PathBuf {
        self.root.join("loudness_cache.json")
    }

    pub fn filter_state_file(&self) -> PathBuf {
        self.root.join("filter_state.toml")
    }

    pub fn playback_settings_file(&self) -> PathBuf {
        self.root.join("playback_settings.toml")
    }

    pub fn view_preferences_file(&self) -> PathBuf {
        self.root.join("view_preferences.toml")
    }

    pub fn legacy_favorites_file(&self) -> PathBuf {
        self.root.join("favorites.txt")
    }

    pub fn legacy_blacklist_file(&self) -> PathBuf {
        self.root.join("blacklist.txt")
    }

    pub fn legacy_play_stats_file(&self) -> PathBuf {
        self.root.join("play_stats.tsv")
    }
}

/// Writes `contents` to `path` via a temporary sibling plus rename.
pub fn write_atomically(path: &Path, contents: &str) -> io::Result<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("no parent directory for {}", path.display()),
            )
        })?;
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("document");
    let staging_path = parent.join(format!("{file_name}.tmp"));
    fs::write(&staging_path, contents)?;
    fs::rename(&staging_path, path)
}

/// Loads a TOML document, falling back to `T::default()` when the file is
/// missing or unreadable. Load failures never propagate.
pub fn load_toml_document<T>(path: &Path) -> T
where
    T: Default + DeserializeOwned,
{
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(
                    "Failed to read state file {}. Using defaults. error={}",
                    path.display(),
                    err
                );
            }
            return T::default();
        }
    };

    match toml::from_str::<T>(&contents) {
        Ok(value) => value,
        Err(err) => {
            warn!(
                "Failed to parse state file {}. Using defaults. error={}",
                path.display(),
                err
            );
            T::default()
        }
    }
}

/// Persists a TOML document, preserving comments and formatting of any
/// existing file by merging the new state into the parsed document.
pub fn persist_toml_document<T>(value: &T, path: &Path) -> io::Result<()>
where
    T: Serialize,
{
    let next_text = toml::to_string(value)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;

    let merged_text = match fs::read_to_string(path) {
        Ok(existing_text) => match merge_preserving_decor(&existing_text, &next_text) {
            Ok(merged) => merged,
            Err(err) => {
                warn!(
                    "Failed to preserve comments for {} ({}). Falling back to plain serialization.",
                    path.display(),
                    err
                );
                next_text
            }
        },
        Err(_) => next_text,
    };

    write_atomically(path, &merged_text)
}

fn merge_preserving_decor(existing_text: &str, next_text: &str) -> Result<String, String> {
    let next_document = next_text
        .parse::<DocumentMut>()
        .map_err(|err| format!("failed to parse serialized state as TOML document: {}", err))?;
    let mut existing_document = existing_text
        .parse::<DocumentMut>()
        .map_err(|err| format!("failed to parse existing state as TOML document: {}", err))?;
    merge_table_with_targeted_updates(existing_document.as_table_mut(), next_document.as_table());
    Ok(existing_document.to_string())
}

fn set_table_value_preserving_decor(table: &mut Table, key: &str, item: Item) {
    let existing_value_decor = table
        .get(key)
        .and_then(|current| current.as_value().map(|value| value.decor().clone()));
    table[key] = item;
    if let Some(existing_value_decor) = existing_value_decor {
        if let Some(next_value) = table[key].as_value_mut() {
            *next_value.decor_mut() = existing_value_decor;
        }
    }
}

fn merge_table_with_targeted_updates(destination: &mut Table, source: &Table) {
    for (key, source_item) in source.iter() {
        match source_item {
            Item::Table(source_table) => {
                if !destination.get(key).is_some_and(Item::is_table) {
                    destination.insert(key, Item::Table(Table::new()));
                }
                let destination_table = destination
                    .get_mut(key)
                    .and_then(Item::as_table_mut)
                    .expect("table inserted above");
                merge_table_with_targeted_updates(destination_table, source_table);
            }
            _ => {
                set_table_value_preserving_decor(destination, key, source_item.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq, serde::Deserialize, serde::Serialize)]
    struct SampleDocument {
        #[serde(default)]
        label: String,
        #[serde(default)]
        count: u32,
    }

    #[test]
    fn test_write_atomically_replaces_previous_contents() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("doc.toml");

        write_atomically(&path, "label = \"first\"\ncount = 1\n").expect("first write");
        write_atomically(&path, "label = \"second\"\ncount = 2\n").expect("second write");

        let loaded: SampleDocument = load_toml_document(&path);
        assert_eq!(loaded.label, "second");
        assert_eq!(loaded.count, 2);
    }

    #[test]
    fn test_load_toml_document_falls_back_on_corrupt_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("doc.toml");
        fs::write(&path, "label = [not toml").expect("write corrupt file");

        let loaded: SampleDocument = load_toml_document(&path);
        assert_eq!(loaded, SampleDocument::default());
    }

    #[test]
    fn test_persist_toml_document_preserves_comments() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("doc.toml");
        fs::write(&path, "# hand-written note\nlabel = \"old\"\ncount = 3\n")
            .expect("seed file");

        let next = SampleDocument {
            label: "new".to_string(),
            count: 3,
        };
        persist_toml_document(&next, &path).expect("persist");

        let text = fs::read_to_string(&path).expect("read back");
        assert!(text.contains("# hand-written note"));
        let loaded: SampleDocument = load_toml_document(&path);
        assert_eq!(loaded, next);
    }
}
