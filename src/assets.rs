//! Media file classification and folder scanning.
//!
//! The file list is built once at startup and shared read-only by the producers.

use crate::error::{LoadError, LoadResult};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
const ANIMATED_EXTENSIONS: &[&str] = &["gif"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv"];

/// Kind of media, inferred from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    AnimatedImage,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::AnimatedImage => "animation",
            MediaKind::Video => "video",
        }
    }

    /// Classify a path by its (case-insensitive) extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let ext = ext.as_str();
        if IMAGE_EXTENSIONS.contains(&ext) {
            Some(MediaKind::Image)
        } else if ANIMATED_EXTENSIONS.contains(&ext) {
            Some(MediaKind::AnimatedImage)
        } else if VIDEO_EXTENSIONS.contains(&ext) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }
}

/// An immutable media file path with its inferred kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaPath {
    path: PathBuf,
    kind: MediaKind,
}

impl MediaPath {
    pub fn new(path: impl Into<PathBuf>) -> LoadResult<Self> {
        let path = path.into();
        match MediaKind::from_path(&path) {
            Some(kind) => Ok(Self { path, kind }),
            None => Err(LoadError::UnsupportedFormat(path)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }
}

impl std::fmt::Display for MediaPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// List the recognised media files directly inside `folder`, sorted by path.
///
/// Videos are skipped unless `include_video` is set.
pub fn scan_folder(folder: &Path, include_video: bool) -> Result<Vec<MediaPath>> {
    anyhow::ensure!(
        folder.is_dir(),
        "media folder {} does not exist",
        folder.display()
    );

    let mut files = Vec::new();
    for entry in WalkDir::new(folder).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("Failed to scan {}", folder.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(media) = MediaPath::new(entry.into_path()) else {
            continue;
        };
        if media.kind() == MediaKind::Video && !include_video {
            continue;
        }
        files.push(media);
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    tracing::debug!("Scanned {}: {} media files", folder.display(), files.len());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn classifies_by_extension_case_insensitively() {
        assert_eq!(MediaKind::from_path(Path::new("a/B.JPG")), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_path(Path::new("x.jpeg")), Some(MediaKind::Image));
        assert_eq!(
            MediaKind::from_path(Path::new("loop.Gif")),
            Some(MediaKind::AnimatedImage)
        );
        assert_eq!(MediaKind::from_path(Path::new("clip.mkv")), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_path(Path::new("notes.txt")), None);
        assert_eq!(MediaKind::from_path(Path::new("README")), None);
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let err = MediaPath::new("slides.pdf").unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedFormat(_)));
    }

    #[test]
    fn scan_filters_sorts_and_respects_video_toggle() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.jpg", "c.gif", "d.mp4", "notes.txt"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("nested.png")).unwrap();
        fs::write(dir.path().join("nested.png").join("e.jpg"), b"x").unwrap();

        let names = |files: Vec<MediaPath>| -> Vec<String> {
            files
                .iter()
                .map(|m| m.path().file_name().unwrap().to_string_lossy().into_owned())
                .collect()
        };

        let with_video = scan_folder(dir.path(), true).unwrap();
        assert_eq!(names(with_video), ["a.jpg", "b.png", "c.gif", "d.mp4"]);

        let stills = scan_folder(dir.path(), false).unwrap();
        assert_eq!(names(stills), ["a.jpg", "b.png", "c.gif"]);
    }

    #[test]
    fn missing_folder_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_folder(&dir.path().join("nope"), true).is_err());
    }
}
