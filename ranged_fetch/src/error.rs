use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use thiserror::Error;

/// Errors that can occur while opening or draining a ranged download.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum DownloadError {
    #[error("unable to determine object size for {0}")]
    UnknownSize(String),

    #[error("size probe failed: {0}")]
    ProbeFailed(Arc<reqwest::Error>),

    #[error("size probe failed: http status {0}")]
    ProbeStatus(reqwest::StatusCode),

    #[error("file too small to partition")]
    FileTooSmall,

    #[error("temp file creation failed: {0}")]
    TempCreateFailed(Arc<std::io::Error>),

    #[error("fetch failed for block {block}: {cause}")]
    FetchFailed {
        block: usize,
        cause: Arc<reqwest::Error>,
    },

    #[error("fetch failed for block {block}: http status {status}")]
    FetchStatus {
        block: usize,
        status: reqwest::StatusCode,
    },

    #[error("truncated body for block {block}: received {received} of {expected} bytes")]
    TruncatedBody {
        block: usize,
        expected: u64,
        received: u64,
    },

    #[error("write failed for block {block}: {cause}")]
    WriteFailed {
        block: usize,
        cause: Arc<std::io::Error>,
    },

    #[error("downstream writer failed: {0}")]
    ConsumerError(Arc<std::io::Error>),

    #[error("IO Error: {0}")]
    IoError(Arc<std::io::Error>),

    #[error("Internal Error: {0}")]
    InternalError(String),
}

pub type Result<T> = std::result::Result<T, DownloadError>;

impl From<std::io::Error> for DownloadError {
    fn from(err: std::io::Error) -> Self {
        DownloadError::IoError(Arc::new(err))
    }
}

/// Thread-safe container for propagating errors from block fetch tasks.
/// Uses an atomic flag for fast checking and a mutex for error storage.
pub struct ErrorState {
    has_error: AtomicBool,
    stored_error: Mutex<Option<DownloadError>>,
}

impl Default for ErrorState {
    fn default() -> Self {
        Self {
            has_error: AtomicBool::new(false),
            stored_error: Mutex::new(None),
        }
    }
}

impl ErrorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self) -> Result<()> {
        if self.has_error.load(AtomicOrdering::Acquire) {
            let error_guard = self.stored_error.lock().unwrap();
            if let Some(err) = error_guard.as_ref() {
                return Err(err.clone());
            }
            return Err(DownloadError::InternalError(
                "Unknown error occurred in background fetch task".to_string(),
            ));
        }
        Ok(())
    }

    /// Records the first error; later errors are dropped so the root cause
    /// is what surfaces to the reader.
    pub fn set(&self, error: DownloadError) {
        let mut error_guard = self.stored_error.lock().unwrap();
        if error_guard.is_none() {
            *error_guard = Some(error);
            self.has_error.store(true, AtomicOrdering::Release);
        }
    }
}
