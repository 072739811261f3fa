//! Core of a local video/photo collection player.
//!
//! Indexes media folders into a persisted library, enriches items with
//! duration and loudness via external decode tools, filters the collection
//! against a declarative query, and serves a randomized no-repeat draw
//! order. The GUI, playback, and dialog layers live outside this crate and
//! talk to it through the traits in [`collaborators`].

pub mod collaborators;
pub mod filter;
pub mod legacy_import;
pub mod library_index;
pub mod library_store;
pub mod media_caches;
pub mod media_file_discovery;
pub mod media_probe;
pub mod playback_queue;
pub mod scan_manager;
pub mod settings;
pub mod storage;
pub mod volume_normalizer;

pub use filter::{eligible_items, AudioFilter, FilterState, TagMatchMode};
pub use library_index::{LibraryIndex, MediaItem, MediaKind, Source};
pub use library_store::{LibraryError, LibraryStore, RefreshSummary};
pub use media_caches::{DurationCache, LoudnessCache, LoudnessMeasurement};
pub use media_probe::{FfmpegProber, MediaProber, ProbeError};
pub use playback_queue::PlaybackQueue;
pub use scan_manager::{CancelToken, ScanError, ScanManager, ScanOutcome, ScanPhase, ScanRun};
pub use settings::{PlaybackSettings, ViewPreferences};
pub use storage::StoragePaths;
pub use volume_normalizer::normalized_volume_percent;
