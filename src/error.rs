//! Error types for volume-walker
//!
//! This module defines:
//! - `StorageError`: the closed taxonomy every OS failure is folded into
//! - `ProbeError`: the raw conditions the metadata probe reports so the
//!   walk engine can branch on them
//! - `ConfigError` and the top-level `WalkerError` for the application
//!
//! Classification is done by errno, never by comparing error strings.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the volume-walker application
#[derive(Error, Debug)]
pub enum WalkerError {
    /// Storage errors surfaced by a walk
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors outside of the scanned volume (stdout etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Interrupted by signal
    #[error("Operation interrupted by signal")]
    Interrupted,

    /// A volume walker thread panicked
    #[error("Walker thread for '{0}' panicked")]
    ThreadPanicked(String),
}

/// Storage errors, the closed taxonomy of the scanner
#[derive(Error, Debug)]
pub enum StorageError {
    /// Cannot find the file
    #[error("file not found")]
    FileNotFound,

    /// No space left on the disk
    #[error("disk path full")]
    DiskFull,

    /// The volume (bucket directory) does not exist
    #[error("volume not found")]
    VolumeNotFound,

    /// The disk returned an I/O fault
    #[error("disk is faulty")]
    FaultyDisk,

    /// Insufficient permissions
    #[error("file access denied")]
    AccessDenied,

    /// Process or system file table exhausted
    #[error("too many open files, please increase 'ulimit -n'")]
    TooManyOpenFiles,

    /// The walk was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// Anything else, passed through
    #[error("{0}")]
    Unknown(io::Error),
}

impl StorageError {
    /// Fold a raw OS error into the taxonomy.
    ///
    /// Order matters: not-a-directory and is-a-directory are reported as
    /// `FileNotFound` before the more generic errno checks run.
    pub fn classify(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            return StorageError::FileNotFound;
        }
        if err.kind() == io::ErrorKind::PermissionDenied {
            return StorageError::AccessDenied;
        }

        let errno = match err.raw_os_error() {
            Some(code) => code,
            None => return StorageError::Unknown(err),
        };

        if errno == libc::ENOTDIR || errno == libc::EISDIR {
            return StorageError::FileNotFound;
        }
        if is_platform_path_not_found(errno) {
            return StorageError::FileNotFound;
        }
        if errno == libc::ENFILE || errno == libc::EMFILE {
            return StorageError::TooManyOpenFiles;
        }
        if is_platform_invalid_handle(errno) {
            return StorageError::FileNotFound;
        }
        if errno == libc::EIO {
            return StorageError::FaultyDisk;
        }
        if errno == libc::EINVAL {
            // Some filesystems reject O_DIRECT style calls with EINVAL
            return StorageError::FileNotFound;
        }
        if errno == libc::ENOSPC {
            return StorageError::DiskFull;
        }
        StorageError::Unknown(err)
    }

    /// Errors that end a whole walk rather than one entry
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StorageError::VolumeNotFound
                | StorageError::FaultyDisk
                | StorageError::AccessDenied
                | StorageError::Cancelled
        )
    }

    /// Check if this is the not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::FileNotFound)
    }
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::classify(err)
    }
}

// ERROR_PATH_NOT_FOUND
#[cfg(windows)]
fn is_platform_path_not_found(errno: i32) -> bool {
    errno == 0x03
}

#[cfg(not(windows))]
fn is_platform_path_not_found(_errno: i32) -> bool {
    false
}

// ERROR_INVALID_HANDLE
#[cfg(windows)]
fn is_platform_invalid_handle(errno: i32) -> bool {
    errno == 0x06
}

#[cfg(not(windows))]
fn is_platform_invalid_handle(_errno: i32) -> bool {
    false
}

/// Conditions reported by the metadata probe
///
/// Kept separate from `StorageError` because the walk engine needs to
/// tell not-found, is-a-directory and not-a-directory apart.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// Metadata file does not exist
    #[error("metadata not found")]
    NotFound,

    /// The metadata path is a directory
    #[error("metadata path is a directory")]
    IsDirectory,

    /// A path component is not a directory
    #[error("metadata path component is not a directory")]
    NotDirectory,

    /// Path rejected before any I/O
    #[error("invalid path: {0}")]
    InvalidPath(&'static str),

    /// Any other I/O error
    #[error("metadata read failed: {0}")]
    Io(io::Error),
}

impl ProbeError {
    /// Outcomes that mean "no object here, try the next candidate"
    pub fn is_not_found_or_dir(&self) -> bool {
        matches!(self, ProbeError::NotFound | ProbeError::IsDirectory)
    }
}

impl From<io::Error> for ProbeError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            return ProbeError::NotFound;
        }
        match err.raw_os_error() {
            Some(libc::EISDIR) => ProbeError::IsDirectory,
            Some(libc::ENOTDIR) => ProbeError::NotDirectory,
            _ => ProbeError::Io(err),
        }
    }
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Volume path cannot be split into disk root and bucket
    #[error("Invalid volume path '{path}': {reason}")]
    InvalidVolumePath { path: PathBuf, reason: String },

    /// Filter prefix must be a single path segment
    #[error("Invalid prefix '{prefix}': must not contain '/'")]
    InvalidPrefix { prefix: String },

    /// Resume cursor outside the base directory
    #[error("Resume path '{forward_to}' is not inside base directory '{base_dir}'")]
    ForwardOutsideBase { forward_to: String, base_dir: String },

    /// No volumes given
    #[error("At least one volume path is required")]
    NoVolumes,

    /// Output queue too small
    #[error("Invalid queue size {size}: must be at least {min}")]
    InvalidQueueSize { size: usize, min: usize },
}

/// Result type alias for WalkerError
pub type Result<T> = std::result::Result<T, WalkerError>;

/// Result type alias for StorageError
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Result type alias for ProbeError
pub type ProbeResult<T> = std::result::Result<T, ProbeError>;
