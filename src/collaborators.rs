//! Narrow interfaces toward the embedding front-end.
//!
//! The core never talks to windows, dialogs, or playback directly; the
//! shell implements these traits and injects them where needed.

use std::path::{Path, PathBuf};

/// Supplies the root folder scans should currently operate on.
pub trait CurrentRootProvider {
    fn current_root(&self) -> Option<PathBuf>;
}

/// Receives scan progress counts, including failures.
pub trait ProgressSink: Send + Sync {
    fn report(&self, processed: usize, total: usize, errors: usize);
}

/// Receives human-readable status text.
pub trait StatusSink: Send + Sync {
    fn status(&self, text: &str);
}

/// Enumerates media files under a root. The implementation owns the walk
/// policy (symlinks, hidden files, ordering).
pub trait DirectoryEnumerator {
    fn enumerate(&self, root: &Path) -> Vec<PathBuf>;
}

/// Progress sink that discards all reports.
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn report(&self, _processed: usize, _total: usize, _errors: usize) {}
}

/// Status sink that forwards text to the log.
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn status(&self, text: &str) {
        log::info!("{}", text);
    }
}
