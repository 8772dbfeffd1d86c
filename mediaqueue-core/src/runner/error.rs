use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("download of entry #{index} failed: {reason}")]
    DownloadFailed { index: usize, reason: String },
    #[error("no video or audio track found for entry #{index}")]
    NoMediaFound { index: usize },
    #[error("muxing entry #{index} failed with status {status:?}")]
    MuxFailed { index: usize, status: Option<i32> },
    #[error("entry #{index} is missing {field} and no answer is available")]
    MissingIdentityField { index: usize, field: &'static str },
    #[error("entry #{index} has malformed metadata: {reason}")]
    InvalidMetadata { index: usize, reason: String },
    #[error("forced overrides {path} are not usable: {reason}")]
    InvalidOverrides { path: PathBuf, reason: String },
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        QueueError::Io {
            source,
            path: path.into(),
        }
    }

    pub fn download(index: usize, reason: impl Into<String>) -> Self {
        QueueError::DownloadFailed {
            index,
            reason: reason.into(),
        }
    }

    /// Failures that a fresh download of the same entry can plausibly fix.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            QueueError::DownloadFailed { .. }
                | QueueError::NoMediaFound { .. }
                | QueueError::MuxFailed { .. }
        )
    }
}

pub type QueueResult<T> = Result<T, QueueError>;
