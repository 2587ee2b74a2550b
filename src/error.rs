//! Error types for BucketSync
//!
//! This module defines the error taxonomy for sync and clear operations,
//! along with the storage-level error returned by object store backends.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for sync and clear operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// Target configuration is missing required fields or is malformed
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Local directory does not exist or is not a directory
    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    /// Symlink loop detected while following links
    #[error("Cyclic symlink detected at '{path}'")]
    CyclicSymlink {
        /// Link that points back at one of its ancestors
        path: PathBuf,
    },

    /// Walking the local tree failed (permissions, I/O)
    #[error("Failed to enumerate '{path}': {source}")]
    Enumeration {
        /// Entry that could not be read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Listing the remote prefix failed
    #[error("Failed to list s3://{bucket}/{prefix}: {source}")]
    RemoteListFailed {
        /// Bucket being listed
        bucket: String,
        /// Prefix being listed
        prefix: String,
        /// Backend error
        #[source]
        source: StoreError,
    },

    /// A single transfer unit failed (every dispatched unit failed)
    #[error("Transfer failed for '{key}': {cause}")]
    TransferFailed {
        /// Key of the first failed unit
        key: String,
        /// Its last error
        #[source]
        cause: StoreError,
    },

    /// Some units succeeded and some did not
    #[error("Partial failure: {succeeded} succeeded, {failed} failed, {not_started} not started")]
    PartialFailure {
        /// Units that succeeded
        succeeded: u64,
        /// Units that failed
        failed: u64,
        /// Units never dispatched
        not_started: u64,
    },

    /// Another operation is already running against the same prefix
    #[error("Another operation is already running against s3://{bucket}/{prefix}")]
    TargetBusy {
        /// Bucket of the busy target
        bucket: String,
        /// Prefix of the busy target
        prefix: String,
    },

    /// I/O error with path context
    #[error("I/O error at '{path}': {source}")]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigInvalid(message.into())
    }

    /// Whether the error was raised before anything was dispatched
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            Self::ConfigInvalid(_)
                | Self::DirectoryNotFound(_)
                | Self::CyclicSymlink { .. }
                | Self::Enumeration { .. }
                | Self::RemoteListFailed { .. }
                | Self::TargetBusy { .. }
        )
    }

    /// Get the local path associated with this error, if any
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::DirectoryNotFound(path)
            | Self::CyclicSymlink { path }
            | Self::Enumeration { path, .. }
            | Self::Io { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Result type alias for BucketSync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Classification of object store failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Object or prefix does not exist
    NotFound,
    /// Credentials rejected or operation not permitted
    AccessDenied,
    /// Bucket does not exist
    NoSuchBucket,
    /// Backend asked us to slow down
    Throttled,
    /// Connection, DNS or timeout failure
    Network,
    /// Local file could not be read for upload
    LocalIo,
    /// Anything else
    Other,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not found",
            Self::AccessDenied => "access denied",
            Self::NoSuchBucket => "no such bucket",
            Self::Throttled => "throttled",
            Self::Network => "network",
            Self::LocalIo => "local i/o",
            Self::Other => "error",
        };
        f.write_str(name)
    }
}

/// Error returned by an object store backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct StoreError {
    /// Failure class
    pub kind: StoreErrorKind,
    /// Backend-provided description
    pub message: String,
}

impl StoreError {
    /// Create a store error of the given kind
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Network, message)
    }

    /// Create a catch-all error
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Other, message)
    }

    /// Errors after which no further units should be dispatched
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            StoreErrorKind::AccessDenied | StoreErrorKind::NoSuchBucket
        )
    }

    /// Check if this error is recoverable (can be retried)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            StoreErrorKind::Network | StoreErrorKind::Throttled
        )
    }
}

impl From<walkdir::Error> for SyncError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(PathBuf::from).unwrap_or_default();
        if err.loop_ancestor().is_some() {
            return SyncError::CyclicSymlink { path };
        }
        match err.into_io_error() {
            Some(source) => SyncError::Enumeration { path, source },
            None => SyncError::Enumeration {
                path,
                source: std::io::Error::new(std::io::ErrorKind::Other, "directory walk failed"),
            },
        }
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| SyncError::io(path, e))
    }
}
