//! One-time merge of legacy flat state documents into the library index.
//!
//! Older releases kept favorites, blacklist, and playback stats as three
//! separate flat files. The merge is idempotent: flags are OR-ed in, play
//! counts merged by maximum, last-played by latest, and paths with no
//! matching item are skipped.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::{info, warn};

use crate::library_store::LibraryStore;
use crate::storage::StoragePaths;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LegacyPlayStat {
    pub play_count: u32,
    pub last_played_unix_ms: Option<i64>,
}

/// Contents of the legacy flat documents, as read from disk.
#[derive(Debug, Clone, Default)]
pub struct LegacyDocuments {
    pub favorites: Vec<String>,
    pub blacklist: Vec<String>,
    pub play_stats: HashMap<String, LegacyPlayStat>,
}

impl LegacyDocuments {
    pub fn is_empty(&self) -> bool {
        self.favorites.is_empty() && self.blacklist.is_empty() && self.play_stats.is_empty()
    }
}

/// Reads whichever legacy documents still exist. Missing files are simply
/// absent; unreadable lines are skipped with a warning.
pub fn read_legacy_documents(paths: &StoragePaths) -> LegacyDocuments {
    LegacyDocuments {
        favorites: read_path_list(&paths.legacy_favorites_file()),
        blacklist: read_path_list(&paths.legacy_blacklist_file()),
        play_stats: read_play_stats(&paths.legacy_play_stats_file()),
    }
}

fn read_path_list(path: &Path) -> Vec<String> {
    let Ok(contents) = fs::read_to_string(path) else {
        return Vec::new();
    };
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Stats rows are `play_count <TAB> last_played_unix_ms <TAB> path`; a
/// last-played of 0 means never recorded.
fn read_play_stats(path: &Path) -> HashMap<String, LegacyPlayStat> {
    let Ok(contents) = fs::read_to_string(path) else {
        return HashMap::new();
    };
    let mut stats = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.splitn(3, '\t');
        let (Some(count), Some(last_played), Some(item_path)) =
            (fields.next(), fields.next(), fields.next())
        else {
            warn!("Skipping malformed legacy stats row: {}", line);
            continue;
        };
        let Ok(play_count) = count.trim().parse::<u32>() else {
            warn!("Skipping legacy stats row with bad count: {}", line);
            continue;
        };
        let last_played_unix_ms = last_played
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|value| *value > 0);
        stats.insert(
            item_path.trim().to_string(),
            LegacyPlayStat {
                play_count,
                last_played_unix_ms,
            },
        );
    }
    stats
}

/// Merges the legacy documents into already-indexed items. Returns the
/// number of items that changed.
pub fn merge_legacy_documents(store: &LibraryStore, documents: &LegacyDocuments) -> usize {
    let mut merged = 0usize;

    for path in &documents.favorites {
        let Some(item) = store.find_item_by_path(path) else {
            continue;
        };
        if !item.is_favorite && store.set_favorite(path, true).is_ok() {
            merged += 1;
        }
    }

    for path in &documents.blacklist {
        let Some(item) = store.find_item_by_path(path) else {
            continue;
        };
        if !item.is_blacklisted && store.set_blacklisted(path, true).is_ok() {
            merged += 1;
        }
    }

    for (path, stat) in &documents.play_stats {
        let Some(mut item) = store.find_item_by_path(path) else {
            continue;
        };
        let next_count = item.play_count.max(stat.play_count);
        let next_last_played = match (item.last_played_unix_ms, stat.last_played_unix_ms) {
            (Some(current), Some(legacy)) => Some(current.max(legacy)),
            (current, legacy) => current.or(legacy),
        };
        if next_count != item.play_count || next_last_played != item.last_played_unix_ms {
            item.play_count = next_count;
            item.last_played_unix_ms = next_last_played;
            if store.update_item(item).is_ok() {
                merged += 1;
            }
        }
    }

    if merged > 0 {
        info!("Merged legacy state into {} item(s)", merged);
    }
    merged
}
