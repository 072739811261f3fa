//! Recognized media extensions and the default recursive file walker.

use std::path::{Path, PathBuf};

use log::debug;

use crate::collaborators::DirectoryEnumerator;
use crate::library_index::MediaKind;

pub const SUPPORTED_VIDEO_EXTENSIONS: [&str; 10] = [
    "mp4", "mkv", "avi", "mov", "wmv", "webm", "m4v", "mpg", "mpeg", "flv",
];
pub const SUPPORTED_PHOTO_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "bmp", "webp"];

/// Classifies a path by extension; `None` when the file is not recognized
/// media.
pub fn media_kind_for_path(path: &Path) -> Option<MediaKind> {
    let extension = path.extension().and_then(|ext| ext.to_str())?;
    if SUPPORTED_VIDEO_EXTENSIONS
        .iter()
        .any(|supported| extension.eq_ignore_ascii_case(supported))
    {
        return Some(MediaKind::Video);
    }
    if SUPPORTED_PHOTO_EXTENSIONS
        .iter()
        .any(|supported| extension.eq_ignore_ascii_case(supported))
    {
        return Some(MediaKind::Photo);
    }
    None
}

pub fn is_supported_media_file(path: &Path) -> bool {
    media_kind_for_path(path).is_some()
}

/// Default [`DirectoryEnumerator`]: an iterative depth-first walk that
/// skips unreadable entries and returns recognized media files sorted.
pub struct RecursiveWalker;

impl DirectoryEnumerator for RecursiveWalker {
    fn enumerate(&self, root: &Path) -> Vec<PathBuf> {
        collect_media_files_from_folder(root)
    }
}

pub fn collect_media_files_from_folder(folder_path: &Path) -> Vec<PathBuf> {
    let mut pending_directories = vec![folder_path.to_path_buf()];
    let mut files = Vec::new();

    while let Some(directory) = pending_directories.pop() {
        let entries = match std::fs::read_dir(&directory) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("Failed to read directory {}: {}", directory.display(), err);
                continue;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(
                        "Failed to read a directory entry in {}: {}",
                        directory.display(),
                        err
                    );
                    continue;
                }
            };

            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(err) => {
                    debug!("Failed to inspect {}: {}", path.display(), err);
                    continue;
                }
            };

            if file_type.is_dir() {
                pending_directories.push(path);
                continue;
            }

            if file_type.is_file() && is_supported_media_file(&path) {
                files.push(path);
            }
        }
    }

    files.sort_unstable();
    files
}
