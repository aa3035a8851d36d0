use std::path::PathBuf;
use thiserror::Error;

/// Batch-level failures. Any of these aborts the run before output is persisted.
///
/// Per-file problems (unreadable bytes, undecodable headers) never show up here;
/// they are recorded in the row instead.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("dataset directory not found or not a directory: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("no files found in {}", .0.display())]
    EmptyDataset(PathBuf),

    #[error("invalid split config: {0}")]
    InvalidSplitConfig(String),

    #[error("file {0:?} has no split assignment")]
    IncompleteJoin(String),

    #[error("failed to persist manifest to {}: {reason}", .path.display())]
    Persistence { path: PathBuf, reason: String },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ManifestError {
    pub fn persistence(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Persistence {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ManifestError>;
