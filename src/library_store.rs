//! Item Store runtime component.
//!
//! Owns the in-memory [`LibraryIndex`] behind one mutex and the act of
//! writing it to disk behind a second, so a slow save never blocks
//! concurrent in-memory reads and mutations. All mutating operations
//! persist the index before returning.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::info;

use crate::collaborators::DirectoryEnumerator;
use crate::library_index::{normalize_path_key, LibraryIndex, MediaItem, MediaKind, Source};
use crate::media_file_discovery::media_kind_for_path;

#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    /// Root folder missing on import/refresh.
    #[error("directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    /// Unknown source id.
    #[error("source not found: {0}")]
    SourceNotFound(String),

    /// No item indexed under the given path.
    #[error("item not found: {0}")]
    ItemNotFound(String),

    /// Failed writing the index document.
    #[error("failed to persist library index: {0}")]
    Persistence(#[from] std::io::Error),
}

/// Counts reported by [`LibraryStore::refresh_source`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub added: usize,
    pub removed: usize,
    pub updated: usize,
}

/// Thread-safe owner of the library index.
pub struct LibraryStore {
    index: Mutex<LibraryIndex>,
    save_lock: Mutex<()>,
    index_path: PathBuf,
}

impl LibraryStore {
    /// Opens the store, loading any existing index document. A missing or
    /// corrupt document starts the store empty rather than failing.
    pub fn open(index_path: impl Into<PathBuf>) -> Self {
        let index_path = index_path.into();
        let index = LibraryIndex::load(&index_path);
        if !index.items.is_empty() {
            info!(
                "Loaded library index: {} source(s), {} item(s)",
                index.sources.len(),
                index.items.len()
            );
        }
        Self {
            index: Mutex::new(index),
            save_lock: Mutex::new(()),
            index_path,
        }
    }

    /// Imports a folder, creating a source for new roots, and returns the
    /// number of newly created items. Re-imported paths keep their
    /// favorite/blacklist/stats/tags/duration metadata; only the path
    /// fields are refreshed.
    pub fn import_folder(
        &self,
        root: &Path,
        display_name: Option<&str>,
        enumerator: &dyn DirectoryEnumerator,
    ) -> Result<usize, LibraryError> {
        if !root.is_dir() {
            return Err(LibraryError::DirectoryNotFound(root.to_path_buf()));
        }

        let discovered = enumerator.enumerate(root);
        let created = {
            let mut index = self.lock_index();
            let source_id = match index.source_by_root(&root.to_string_lossy()) {
                Some(source) => source.id.clone(),
                None => {
                    let source = Source {
                        id: uuid::Uuid::new_v4().to_string(),
                        root_path: root.to_string_lossy().to_string(),
                        display_name: display_name.map(str::to_string),
                        is_enabled: true,
                    };
                    let id = source.id.clone();
                    index.sources.push(source);
                    id
                }
            };

            let mut created = 0usize;
            for file_path in &discovered {
                if Self::upsert_discovered_file(&mut index, &source_id, root, file_path) {
                    created += 1;
                }
            }
            created
        };

        self.save()?;
        info!(
            "Imported {}: {} new item(s) of {} discovered",
            root.display(),
            created,
            discovered.len()
        );
        Ok(created)
    }

    /// Re-enumerates a source's root: adds items for new files, drops
    /// items whose files vanished, refreshes path fields whose resolved
    /// spelling changed.
    pub fn refresh_source(
        &self,
        source_id: &str,
        enumerator: &dyn DirectoryEnumerator,
    ) -> Result<RefreshSummary, LibraryError> {
        let root = {
            let index = self.lock_index();
            let source = index
                .source_by_id(source_id)
                .ok_or_else(|| LibraryError::SourceNotFound(source_id.to_string()))?;
            PathBuf::from(&source.root_path)
        };
        if !root.is_dir() {
            return Err(LibraryError::DirectoryNotFound(root));
        }

        let discovered = enumerator.enumerate(&root);
        let summary = {
            let mut index = self.lock_index();
            let mut summary = RefreshSummary::default();
            let discovered_keys: HashSet<String> = discovered
                .iter()
                .map(|path| normalize_path_key(&path.to_string_lossy()))
                .collect();

            let before = index.items.len();
            index.items.retain(|item| {
                item.source_id != source_id || discovered_keys.contains(&item.path_key())
            });
            summary.removed = before - index.items.len();

            for file_path in &discovered {
                let path_string = file_path.to_string_lossy().to_string();
                match index.find_item(&path_string) {
                    Some(existing) => {
                        let path_changed = existing.full_path != path_string;
                        if path_changed {
                            summary.updated += 1;
                        }
                        if path_changed || existing.source_id != source_id {
                            Self::upsert_discovered_file(&mut index, source_id, &root, file_path);
                        }
                    }
                    None => {
                        Self::upsert_discovered_file(&mut index, source_id, &root, file_path);
                        summary.added += 1;
                    }
                }
            }
            summary
        };

        self.save()?;
        info!(
            "Refreshed source {}: added={} removed={} updated={}",
            source_id, summary.added, summary.removed, summary.updated
        );
        Ok(summary)
    }

    /// Removes a source and all items referencing it; returns the removed
    /// item count.
    pub fn remove_source(&self, source_id: &str) -> Result<usize, LibraryError> {
        let removed = {
            let mut index = self.lock_index();
            if index.source_by_id(source_id).is_none() {
                return Err(LibraryError::SourceNotFound(source_id.to_string()));
            }
            index.remove_source_cascade(source_id)
        };
        self.save()?;
        Ok(removed)
    }

    pub fn set_source_enabled(&self, source_id: &str, enabled: bool) -> Result<(), LibraryError> {
        {
            let mut index = self.lock_index();
            let source = index
                .source_by_id_mut(source_id)
                .ok_or_else(|| LibraryError::SourceNotFound(source_id.to_string()))?;
            source.is_enabled = enabled;
        }
        self.save()
    }

    pub fn rename_source(&self, source_id: &str, display_name: &str) -> Result<(), LibraryError> {
        {
            let mut index = self.lock_index();
            let source = index
                .source_by_id_mut(source_id)
                .ok_or_else(|| LibraryError::SourceNotFound(source_id.to_string()))?;
            source.display_name = Some(display_name.to_string());
        }
        self.save()
    }

    /// Replaces the stored item matching `item.full_path`.
    pub fn update_item(&self, item: MediaItem) -> Result<(), LibraryError> {
        {
            let mut index = self.lock_index();
            let stored = index
                .find_item_mut(&item.full_path)
                .ok_or_else(|| LibraryError::ItemNotFound(item.full_path.clone()))?;
            *stored = item;
        }
        self.save()
    }

    pub fn remove_item(&self, path: &str) -> Result<(), LibraryError> {
        {
            let mut index = self.lock_index();
            let key = normalize_path_key(path);
            let before = index.items.len();
            index.items.retain(|item| item.path_key() != key);
            if index.items.len() == before {
                return Err(LibraryError::ItemNotFound(path.to_string()));
            }
        }
        self.save()
    }

    pub fn find_item_by_path(&self, path: &str) -> Option<MediaItem> {
        self.lock_index().find_item(path).cloned()
    }

    /// Items belonging to one source, or every item when `source_id` is
    /// `None`.
    pub fn items_by_source(&self, source_id: Option<&str>) -> Vec<MediaItem> {
        let index = self.lock_index();
        index
            .items
            .iter()
            .filter(|item| source_id.is_none_or(|id| item.source_id == id))
            .cloned()
            .collect()
    }

    pub fn sources(&self) -> Vec<Source> {
        self.lock_index().sources.clone()
    }

    pub fn set_favorite(&self, path: &str, favorite: bool) -> Result<(), LibraryError> {
        self.mutate_item(path, |item| item.is_favorite = favorite)
    }

    pub fn set_blacklisted(&self, path: &str, blacklisted: bool) -> Result<(), LibraryError> {
        self.mutate_item(path, |item| item.is_blacklisted = blacklisted)
    }

    /// Increments the play count and stamps the last-played time.
    pub fn record_play(&self, path: &str, now_unix_ms: i64) -> Result<(), LibraryError> {
        self.mutate_item(path, |item| {
            item.play_count = item.play_count.saturating_add(1);
            item.last_played_unix_ms = Some(now_unix_ms);
        })
    }

    pub fn add_tag(&self, path: &str, tag: &str) -> Result<(), LibraryError> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Ok(());
        }
        {
            let mut index = self.lock_index();
            let item = index
                .find_item_mut(path)
                .ok_or_else(|| LibraryError::ItemNotFound(path.to_string()))?;
            item.tags.insert(tag.to_string());
            index.known_tags.insert(tag.to_string());
        }
        self.save()
    }

    pub fn remove_tag(&self, path: &str, tag: &str) -> Result<(), LibraryError> {
        self.mutate_item(path, |item| {
            item.tags.remove(tag);
        })
    }

    pub fn known_tags(&self) -> Vec<String> {
        self.lock_index().known_tags.iter().cloned().collect()
    }

    /// Scan write-back: duration plus audio-stream presence. Unknown paths
    /// are ignored (the file may have been indexed under another source or
    /// removed mid-scan).
    pub fn apply_duration_probe(&self, path: &str, duration_secs: u32, has_audio: bool) {
        let mut index = self.lock_index();
        if let Some(item) = index.find_item_mut(path) {
            item.duration_secs = Some(duration_secs);
            item.has_audio = Some(has_audio);
        }
    }

    /// Scan write-back: integrated loudness. Unknown paths are ignored.
    pub fn apply_loudness(&self, path: &str, mean_volume_db: f64) {
        let mut index = self.lock_index();
        if let Some(item) = index.find_item_mut(path) {
            item.integrated_loudness_db = Some(mean_volume_db);
        }
    }

    /// Cloned view of the whole index for filter evaluation.
    pub fn snapshot(&self) -> LibraryIndex {
        self.lock_index().clone()
    }

    /// Serializes the current index and writes it atomically. The index
    /// mutex is held only while cloning; the save mutex serializes the
    /// disk write itself.
    pub fn save(&self) -> Result<(), LibraryError> {
        let snapshot = self.lock_index().clone();
        let _save_guard = self
            .save_lock
            .lock()
            .expect("library save mutex should not be poisoned");
        snapshot.save(&self.index_path)?;
        Ok(())
    }

    fn lock_index(&self) -> std::sync::MutexGuard<'_, LibraryIndex> {
        self.index
            .lock()
            .expect("library index mutex should not be poisoned")
    }

    fn mutate_item<F>(&self, path: &str, mutate: F) -> Result<(), LibraryError>
    where
        F: FnOnce(&mut MediaItem),
    {
        {
            let mut index = self.lock_index();
            let item = index
                .find_item_mut(path)
                .ok_or_else(|| LibraryError::ItemNotFound(path.to_string()))?;
            mutate(item);
        }
        self.save()
    }

    /// Creates or path-refreshes the item for one discovered file.
    /// Returns true when a new item was created.
    fn upsert_discovered_file(
        index: &mut LibraryIndex,
        source_id: &str,
        root: &Path,
        file_path: &Path,
    ) -> bool {
        let full_path = file_path.to_string_lossy().to_string();
        let relative_path = file_path
            .strip_prefix(root)
            .map(|relative| relative.to_string_lossy().to_string())
            .unwrap_or_else(|_| full_path.clone());
        let file_name = file_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| full_path.clone());
        let media_kind = media_kind_for_path(file_path).unwrap_or(MediaKind::Video);

        if let Some(existing) = index.find_item_mut(&full_path) {
            existing.source_id = source_id.to_string();
            existing.full_path = full_path;
            existing.relative_path = relative_path;
            existing.file_name = file_name;
            existing.media_kind = media_kind;
            return false;
        }

        index.items.push(MediaItem {
            source_id: source_id.to_string(),
            full_path,
            relative_path,
            file_name,
            media_kind,
            is_favorite: false,
            is_blacklisted: false,
            play_count: 0,
            last_played_unix_ms: None,
            duration_secs: None,
            has_audio: None,
            integrated_loudness_db: None,
            tags: Default::default(),
        });
        true
    }
}
