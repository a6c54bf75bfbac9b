//! Error types for apt/dpkg operations.
//!
//! Errors are categorized to enable retry logic and appropriate user
//! feedback. apt prints everything interesting on stderr, so most variants
//! are produced by [`Error::from_apt_output`].

use thiserror::Error;

/// Categories of package manager errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network-related errors (transient, retryable)
    Network,
    /// Another process holds the dpkg/apt lock (transient, retryable)
    Locked,
    /// Package has no candidate in any configured source
    NotFound,
    /// Permission denied (not root and no sudo)
    Permission,
    /// apt-get or dpkg-query missing from the host
    AptNotFound,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Locked)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::Locked => "Package manager is locked",
            Self::NotFound => "Package not found",
            Self::Permission => "Permission denied",
            Self::AptNotFound => "apt not installed",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check mirror connectivity and DNS, then try again",
            Self::Locked => "Wait for unattended-upgrades or the other apt process to finish",
            Self::NotFound => "Verify the package name or register the vendor repository",
            Self::Permission => "Run as root or allow passwordless sudo for apt-get",
            Self::AptNotFound => "This host is not Debian-based; native packages are unavailable",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that can occur during package manager operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Network-related error (mirror unreachable, DNS, etc.)
    #[error("network error: {message}")]
    Network {
        /// Detailed error message from apt
        message: String,
    },

    /// The dpkg frontend lock is held by another process
    #[error("package manager locked: {message}")]
    Locked {
        /// Lock message reported by apt
        message: String,
    },

    /// Package could not be located
    #[error("package not found: {name}")]
    NotFound {
        /// Name of the package that could not be found
        name: String,
    },

    /// Permission denied
    #[error("permission denied: {message}")]
    Permission {
        /// Details about what permission was denied
        message: String,
    },

    /// apt-get is not installed or not found in PATH
    #[error("apt-get not found; this host does not look Debian-based")]
    AptNotFound,

    /// Command execution failed
    #[error("command failed: {message}")]
    CommandFailed {
        /// Description of what command failed
        message: String,
        /// Standard error output from the failed command
        stderr: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Network { .. } => ErrorCategory::Network,
            Error::Locked { .. } => ErrorCategory::Locked,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::Permission { .. } => ErrorCategory::Permission,
            Error::AptNotFound => ErrorCategory::AptNotFound,
            _ => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Create an error from apt/dpkg command output.
    ///
    /// Analyzes stderr to categorize the error appropriately.
    pub fn from_apt_output(stderr: &str, context: &str) -> Self {
        let stderr_lower = stderr.to_lowercase();

        if stderr_lower.contains("could not get lock")
            || stderr_lower.contains("unable to acquire the dpkg frontend lock")
            || stderr_lower.contains("unable to lock")
        {
            return Error::Locked {
                message: stderr.trim().to_string(),
            };
        }

        if stderr_lower.contains("temporary failure resolving")
            || stderr_lower.contains("failed to fetch")
            || stderr_lower.contains("could not resolve")
            || stderr_lower.contains("connection timed out")
            || stderr_lower.contains("connection refused")
            || stderr_lower.contains("network is unreachable")
        {
            return Error::Network {
                message: stderr.trim().to_string(),
            };
        }

        if let Some(name) = missing_package_name(stderr) {
            return Error::NotFound { name };
        }

        if stderr_lower.contains("permission denied")
            || stderr_lower.contains("are you root")
            || stderr_lower.contains("a password is required")
        {
            return Error::Permission {
                message: stderr.trim().to_string(),
            };
        }

        Error::CommandFailed {
            message: context.to_string(),
            stderr: stderr.trim().to_string(),
        }
    }
}

/// Extract the package name from "Unable to locate package X" or
/// "Package 'X' has no installation candidate".
fn missing_package_name(stderr: &str) -> Option<String> {
    for line in stderr.lines() {
        if let Some(rest) = line.split("Unable to locate package ").nth(1) {
            return rest.split_whitespace().next().map(str::to_string);
        }
        if line.contains("has no installation candidate") {
            return line
                .split('\'')
                .nth(1)
                .map(str::to_string)
                .or_else(|| Some("unknown".to_string()));
        }
    }
    None
}

/// Result type for package manager operations.
pub type Result<T> = std::result::Result<T, Error>;
