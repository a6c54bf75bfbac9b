//! Error types for toolchain operations.
//!
//! Errors are categorized to enable smart retry logic and appropriate user
//! feedback. An integrity failure (checksum mismatch) is its own category
//! because callers must never treat it as a transient network hiccup.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias for toolchain operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of toolchain errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network-related errors (transient, retryable).
    Network,
    /// Platform not supported.
    Platform,
    /// Tool or version not found.
    NotFound,
    /// Downloaded artifact does not match its published checksum.
    Integrity,
    /// Permission denied during installation.
    Permission,
    /// Decompression or file format error.
    Format,
    /// Other/unknown errors.
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::Platform => "Unsupported platform",
            Self::NotFound => "Tool or version not found",
            Self::Integrity => "Checksum verification failed",
            Self::Permission => "Permission denied",
            Self::Format => "Invalid file format",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check your internet connection and try again",
            Self::Platform => "This tool may not be available for your platform",
            Self::NotFound => "Verify the version pin refers to a published release",
            Self::Integrity => {
                "The download does not match the published checksum; do not install it"
            }
            Self::Permission => "Check directory permissions or run with appropriate access",
            Self::Format => "The downloaded file may be corrupted, try again",
            Self::Other => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during toolchain operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to detect the current platform.
    #[error("unsupported platform: {os}/{arch}")]
    UnsupportedPlatform {
        /// Operating system.
        os: String,
        /// CPU architecture.
        arch: String,
    },

    /// HTTP request failed.
    #[error("HTTP request failed: {message}")]
    HttpError {
        /// Error message.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    /// Failed to download a release artifact.
    #[error("download failed for {url}: {message}")]
    DownloadFailed {
        /// URL being downloaded.
        url: String,
        /// Error message.
        message: String,
    },

    /// Checksum manifest has no entry for the artifact.
    #[error("no checksum for {file} in {manifest}")]
    ChecksumMissing {
        /// Artifact file name.
        file: String,
        /// Manifest URL.
        manifest: String,
    },

    /// Artifact digest does not match the published checksum.
    #[error("checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Artifact file name.
        file: String,
        /// Published digest.
        expected: String,
        /// Computed digest.
        actual: String,
    },

    /// Failed to extract an archive.
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    /// IO error during file operations.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Version not found upstream.
    #[error("version {version} not found for {tool}")]
    VersionNotFound {
        /// Tool name.
        tool: String,
        /// Requested version.
        version: String,
    },

    /// Invalid response from a release API.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an HTTP error.
    pub fn http(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::HttpError {
            message: message.into(),
            status,
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::UnsupportedPlatform { .. } => ErrorCategory::Platform,
            Error::HttpError {
                status: Some(404), ..
            } => ErrorCategory::NotFound,
            Error::HttpError { .. } => ErrorCategory::Network,
            Error::DownloadFailed { .. } => ErrorCategory::Network,
            Error::ChecksumMissing { .. } => ErrorCategory::Integrity,
            Error::ChecksumMismatch { .. } => ErrorCategory::Integrity,
            Error::ExtractionFailed(_) => ErrorCategory::Format,
            Error::Io { source, .. } => {
                if source.kind() == io::ErrorKind::PermissionDenied {
                    ErrorCategory::Permission
                } else {
                    ErrorCategory::Other
                }
            }
            Error::VersionNotFound { .. } => ErrorCategory::NotFound,
            Error::InvalidResponse(_) => ErrorCategory::Format,
            Error::Other(_) => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Whether this error means the artifact failed integrity verification.
    #[must_use]
    pub fn is_integrity(&self) -> bool {
        self.category() == ErrorCategory::Integrity
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::HttpError {
                message: format!("HTTP {code}"),
                status: Some(code),
            },
            other => Self::HttpError {
                message: other.to_string(),
                status: None,
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::Network.is_retryable());
        assert!(!ErrorCategory::Platform.is_retryable());
        assert!(!ErrorCategory::NotFound.is_retryable());
        assert!(!ErrorCategory::Integrity.is_retryable());
        assert!(!ErrorCategory::Permission.is_retryable());
        assert!(!ErrorCategory::Format.is_retryable());
        assert!(!ErrorCategory::Other.is_retryable());
    }

    #[test]
    fn test_checksum_mismatch_is_integrity() {
        let err = Error::ChecksumMismatch {
            file: "terraform_1.9.5_linux_amd64.zip".to_string(),
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Integrity);
        assert!(err.is_integrity());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_http_404_is_not_found() {
        let err = Error::http("HTTP 404", Some(404));
        assert_eq!(err.category(), ErrorCategory::NotFound);

        let err = Error::http("connection reset", None);
        assert_eq!(err.category(), ErrorCategory::Network);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_io_permission_category() {
        let err = Error::io(
            "/usr/local/bin/helm",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.category(), ErrorCategory::Permission);
    }

    #[test]
    fn test_error_display() {
        let err = Error::VersionNotFound {
            tool: "sops".to_string(),
            version: "9.9.9".to_string(),
        };
        assert_eq!(err.to_string(), "version 9.9.9 not found for sops");
    }
}
