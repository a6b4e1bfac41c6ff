//! Error taxonomy for the media preparation path.
//!
//! Every variant stays local to the producers: a failed load is logged and
//! another file is picked, nothing here ever reaches the render loop.

use std::path::{Path, PathBuf};

pub type LoadResult<T> = Result<T, LoadError>;

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported media format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("cannot decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("no decodable frames in {}", .0.display())]
    EmptyMedia(PathBuf),
}

impl LoadError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn decode(path: &Path, reason: impl ToString) -> Self {
        Self::Decode {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn empty(path: &Path) -> Self {
        Self::EmptyMedia(path.to_path_buf())
    }

    /// Maps an `image` crate error, keeping I/O failures distinct from corrupt data.
    pub fn from_image(path: &Path, err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(source) => Self::io(path, source),
            other => Self::decode(path, other),
        }
    }
}

/// Raised by the compositor when a pixel buffer cannot be composited.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ComposeError {
    #[error("malformed pixel buffer: {0}")]
    Malformed(String),
}
