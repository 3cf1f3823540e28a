//! Error categories surfaced by the core (spec §7).

use std::fmt;
use std::io;

/// An error surfaced by the filesystem adapter, the mutation engine, or
/// path validation. Adapter errors bubble unchanged to the caller; the
/// index is never patched when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The path does not exist on disk.
    NotFound { path: String },
    /// The destination already exists and the operation doesn't allow it.
    Exists { path: String },
    /// A directory removal target still has children.
    NotEmpty { path: String },
    /// The OS denied the operation.
    Permission { path: String },
    /// A rename crossed filesystems and the fallback copy+unlink failed too.
    CrossDevice { path: String },
    /// Any other I/O failure not covered above.
    IOError { path: String, message: String },
    /// Path sanity or rename validation failed before any disk call.
    Invalid { reason: String },
    /// A config flag rejected the mutation before it touched disk.
    ReadOnly,
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { path } => write!(f, "not found: {path}"),
            Self::Exists { path } => write!(f, "already exists: {path}"),
            Self::NotEmpty { path } => write!(f, "directory not empty: {path}"),
            Self::Permission { path } => write!(f, "permission denied: {path}"),
            Self::CrossDevice { path } => write!(f, "cross-device operation failed: {path}"),
            Self::IOError { path, message } => write!(f, "I/O error at {path}: {message}"),
            Self::Invalid { reason } => write!(f, "invalid operation: {reason}"),
            Self::ReadOnly => write!(f, "index is read-only"),
        }
    }
}

impl std::error::Error for CoreError {}

impl CoreError {
    /// Classifies a raw I/O error against a path, the way the teacher's
    /// `WriteOperationError::from(std::io::Error)` does for its own error
    /// enum.
    pub fn from_io(err: io::Error, path: impl Into<String>) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound { path },
            io::ErrorKind::AlreadyExists => Self::Exists { path },
            io::ErrorKind::PermissionDenied => Self::Permission { path },
            #[allow(unreachable_patterns, reason = "DirectoryNotEmpty is nightly-only on some targets")]
            io::ErrorKind::DirectoryNotEmpty => Self::NotEmpty { path },
            _ => {
                if let Some(code) = err.raw_os_error() {
                    // ENOTEMPTY (39 on Linux) isn't always mapped to a stable
                    // ErrorKind depending on the toolchain.
                    if code == 39 {
                        return Self::NotEmpty { path };
                    }
                    // EXDEV (18 on Linux) — cross-device rename.
                    if code == 18 {
                        return Self::CrossDevice { path };
                    }
                }
                Self::IOError {
                    path,
                    message: err.to_string(),
                }
            }
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
