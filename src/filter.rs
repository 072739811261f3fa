//! Declarative filter state and the eligibility engine.
//!
//! [`eligible_items`] evaluates every active predicate over an index
//! snapshot. All predicates are pure, so the function is safe to call
//! concurrently with scans and stat mutations; output order is
//! deterministic (sorted by path key).

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use crate::library_index::{default_true, LibraryIndex, MediaItem};
use crate::storage::{load_toml_document, persist_toml_document};

/// Audio-presence predicate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFilter {
    #[default]
    PlayAll,
    WithAudioOnly,
    WithoutAudioOnly,
}

/// How `selected_tags` combines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TagMatchMode {
    /// Item must carry every selected tag.
    #[default]
    And,
    /// Item must carry at least one selected tag.
    Or,
}

/// The single source of truth for eligibility, persisted to
/// `filter_state.toml`.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct FilterState {
    #[serde(default)]
    pub favorites_only: bool,
    #[serde(default = "default_true")]
    pub exclude_blacklisted: bool,
    #[serde(default)]
    pub only_never_played: bool,
    #[serde(default)]
    pub audio_filter: AudioFilter,
    #[serde(default)]
    pub min_duration_secs: Option<u32>,
    #[serde(default)]
    pub max_duration_secs: Option<u32>,
    #[serde(default)]
    pub selected_tags: BTreeSet<String>,
    #[serde(default)]
    pub tag_match_mode: TagMatchMode,
    #[serde(default)]
    pub only_known_duration: bool,
    #[serde(default)]
    pub only_known_loudness: bool,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            favorites_only: false,
            exclude_blacklisted: true,
            only_never_played: false,
            audio_filter: AudioFilter::PlayAll,
            min_duration_secs: None,
            max_duration_secs: None,
            selected_tags: BTreeSet::new(),
            tag_match_mode: TagMatchMode::And,
            only_known_duration: false,
            only_known_loudness: false,
        }
    }
}

impl FilterState {
    pub fn load(path: &Path) -> Self {
        load_toml_document(path)
    }

    pub fn persist(&self, path: &Path) -> std::io::Result<()> {
        persist_toml_document(self, path)
    }
}

/// Computes the eligible subset of `index` under `filter`.
///
/// `check_file_exists` stats every candidate; the cheaper variant skips
/// the check for counting and queue priming, where existence is validated
/// lazily at play time.
pub fn eligible_items(
    filter: &FilterState,
    index: &LibraryIndex,
    check_file_exists: bool,
) -> Vec<MediaItem> {
    let enabled_sources: HashSet<&str> = index
        .sources
        .iter()
        .filter(|source| source.is_enabled)
        .map(|source| source.id.as_str())
        .collect();

    let mut eligible: Vec<MediaItem> = index
        .items
        .iter()
        .filter(|item| item_passes(filter, item, &enabled_sources, check_file_exists))
        .cloned()
        .collect();
    eligible.sort_by_key(|item| item.path_key());
    eligible
}

fn item_passes(
    filter: &FilterState,
    item: &MediaItem,
    enabled_sources: &HashSet<&str>,
    check_file_exists: bool,
) -> bool {
    if !enabled_sources.contains(item.source_id.as_str()) {
        return false;
    }
    if check_file_exists && !Path::new(&item.full_path).exists() {
        return false;
    }
    if filter.exclude_blacklisted && item.is_blacklisted {
        return false;
    }
    if filter.favorites_only && !item.is_favorite {
        return false;
    }
    if filter.only_never_played && item.play_count > 0 {
        return false;
    }
    match filter.audio_filter {
        AudioFilter::PlayAll => {}
        AudioFilter::WithAudioOnly => {
            if item.has_audio != Some(true) {
                return false;
            }
        }
        AudioFilter::WithoutAudioOnly => {
            if item.has_audio != Some(false) {
                return false;
            }
        }
    }
    if filter.min_duration_secs.is_some() || filter.max_duration_secs.is_some() {
        // Unknown duration fails any bound check.
        let Some(duration) = item.duration_secs else {
            return false;
        };
        if filter.min_duration_secs.is_some_and(|min| duration < min) {
            return false;
        }
        if filter.max_duration_secs.is_some_and(|max| duration > max) {
            return false;
        }
    }
    if filter.only_known_duration && item.duration_secs.is_none() {
        return false;
    }
    if filter.only_known_loudness && item.integrated_loudness_db.is_none() {
        return false;
    }
    if !filter.selected_tags.is_empty() {
        let matches = match filter.tag_match_mode {
            TagMatchMode::And => filter
                .selected_tags
                .iter()
                .all(|tag| item.tags.contains(tag)),
            TagMatchMode::Or => filter
                .selected_tags
                .iter()
                .any(|tag| item.tags.contains(tag)),
        };
        if !matches {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library_index::{MediaKind, Source};

    fn source(id: &str, enabled: bool) -> Source {
        Source {
            id: id.to_string(),
            root_path: format!("/{id}"),
            display_name: None,
            is_enabled: enabled,
        }
    }

    fn item(source_id: &str, name: &str) -> MediaItem {
        MediaItem {
            source_id: source_id.to_string(),
            full_path: format!("/{source_id}/{name}"),
            relative_path: name.to_string(),
            file_name: name.to_string(),
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

    fn index_with(sources: Vec<Source>, items: Vec<MediaItem>) -> LibraryIndex {
        let mut index = LibraryIndex::default();
        index.sources = sources;
        index.items = items;
        index
    }

    #[test]
    fn test_default_filter_yields_enabled_source_items() {
        let mut blacklisted = item("on", "b.mp4");
        blacklisted.is_blacklisted = true;
        let index = index_with(
            vec![source("on", true), source("off", false)],
            vec![item("on", "a.mp4"), blacklisted, item("off", "c.mp4")],
        );

        let mut no_blacklist_filter = FilterState::default();
        no_blacklist_filter.exclude_blacklisted = false;
        let eligible = eligible_items(&no_blacklist_filter, &index, false);
        let names: Vec<_> = eligible.iter().map(|item| item.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.mp4", "b.mp4"]);
    }

    #[test]
    fn test_blacklist_excluded_by_default() {
        let mut blacklisted = item("s", "b.mp4");
        blacklisted.is_blacklisted = true;
        let index = index_with(
            vec![source("s", true)],
            vec![item("s", "a.mp4"), blacklisted],
        );

        let eligible = eligible_items(&FilterState::default(), &index, false);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].file_name, "a.mp4");
    }

    #[test]
    fn test_favorites_and_never_played() {
        let mut favorite = item("s", "fav.mp4");
        favorite.is_favorite = true;
        let mut played_favorite = item("s", "played.mp4");
        played_favorite.is_favorite = true;
        played_favorite.play_count = 3;
        let index = index_with(
            vec![source("s", true)],
            vec![item("s", "plain.mp4"), favorite, played_favorite],
        );

        let mut filter = FilterState::default();
        filter.favorites_only = true;
        filter.only_never_played = true;
        let eligible = eligible_items(&filter, &index, false);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].file_name, "fav.mp4");
    }

    #[test]
    fn test_audio_filter_requires_known_value() {
        let mut with_audio = item("s", "audio.mp4");
        with_audio.has_audio = Some(true);
        let mut silent = item("s", "silent.mp4");
        silent.has_audio = Some(false);
        let unknown = item("s", "unknown.mp4");
        let index = index_with(
            vec![source("s", true)],
            vec![with_audio, silent, unknown],
        );

        let mut filter = FilterState::default();
        filter.audio_filter = AudioFilter::WithAudioOnly;
        let eligible = eligible_items(&filter, &index, false);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].file_name, "audio.mp4");

        filter.audio_filter = AudioFilter::WithoutAudioOnly;
        let eligible = eligible_items(&filter, &index, false);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].file_name, "silent.mp4");
    }

    #[test]
    fn test_duration_bounds_are_inclusive_and_unknown_fails() {
        let mut short = item("s", "short.mp4");
        short.duration_secs = Some(10);
        let mut exact_min = item("s", "min.mp4");
        exact_min.duration_secs = Some(30);
        let mut exact_max = item("s", "max.mp4");
        exact_max.duration_secs = Some(90);
        let mut long = item("s", "long.mp4");
        long.duration_secs = Some(120);
        let unknown = item("s", "unknown.mp4");
        let index = index_with(
            vec![source("s", true)],
            vec![short, exact_min, exact_max, long, unknown],
        );

        let mut filter = FilterState::default();
        filter.min_duration_secs = Some(30);
        filter.max_duration_secs = Some(90);
        let eligible = eligible_items(&filter, &index, false);
        let names: Vec<_> = eligible.iter().map(|item| item.file_name.as_str()).collect();
        assert_eq!(names, vec!["max.mp4", "min.mp4"]);
    }

    #[test]
    fn test_tag_modes() {
        let mut both = item("s", "both.mp4");
        both.tags.insert("family".to_string());
        both.tags.insert("trip".to_string());
        let mut one = item("s", "one.mp4");
        one.tags.insert("family".to_string());
        let none = item("s", "none.mp4");
        let index = index_with(vec![source("s", true)], vec![both, one, none]);

        let mut filter = FilterState::default();
        filter.selected_tags.insert("family".to_string());
        filter.selected_tags.insert("trip".to_string());

        filter.tag_match_mode = TagMatchMode::And;
        let eligible = eligible_items(&filter, &index, false);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].file_name, "both.mp4");

        filter.tag_match_mode = TagMatchMode::Or;
        let eligible = eligible_items(&filter, &index, false);
        assert_eq!(eligible.len(), 2);
    }

    #[test]
    fn test_known_duration_and_loudness_predicates() {
        let mut enriched = item("s", "enriched.mp4");
        enriched.duration_secs = Some(40);
        enriched.integrated_loudness_db = Some(-21.0);
        let bare = item("s", "bare.mp4");
        let index = index_with(vec![source("s", true)], vec![enriched, bare]);

        let mut filter = FilterState::default();
        filter.only_known_duration = true;
        filter.only_known_loudness = true;
        let eligible = eligible_items(&filter, &index, false);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].file_name, "enriched.mp4");
    }

    #[test]
    fn test_existence_check_drops_vanished_files() {
        let media_dir = tempfile::tempdir().expect("media dir");
        let real_path = media_dir.path().join("real.mp4");
        std::fs::write(&real_path, b"x").expect("file");

        let mut real = item("s", "real.mp4");
        real.full_path = real_path.to_string_lossy().to_string();
        let ghost = item("s", "ghost.mp4");
        let index = index_with(vec![source("s", true)], vec![real, ghost]);

        let eligible = eligible_items(&FilterState::default(), &index, true);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].file_name, "real.mp4");
    }

    #[test]
    fn test_filter_state_document_roundtrip() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("filter_state.toml");

        let mut filter = FilterState::default();
        filter.favorites_only = true;
        filter.audio_filter = AudioFilter::WithAudioOnly;
        filter.min_duration_secs = Some(5);
        filter.selected_tags.insert("family".to_string());
        filter.persist(&path).expect("persist");

        assert_eq!(FilterState::load(&path), filter);
        assert_eq!(
            FilterState::load(&dir.path().join("missing.toml")),
            FilterState::default()
        );
    }
}
