//! Error types
//!
//! [`Error`] covers catalog/profile defects and persistence failures; these
//! short-circuit whatever operation hit them. [`StrategyError`] is raised by
//! a single entry's install or removal and is collected into the run report
//! instead of aborting the run.

use std::io;
use std::path::PathBuf;

use crate::types::CatalogKey;

pub type Result<T> = std::result::Result<T, Error>;

/// Result of a single entry's strategy call.
pub type StrategyResult<T> = std::result::Result<T, StrategyError>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown catalog key: {0}")]
    UnknownKey(String),

    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("unknown profile: {0}")]
    UnknownProfile(String),

    #[error("profile {profile} references unknown catalog key {key}")]
    ProfileReferencesUnknownKey { profile: String, key: String },

    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),

    #[error("unknown version pin: {0}")]
    UnknownPin(String),

    #[error("invalid value {value:?} for {pin}: {reason}")]
    InvalidPin {
        pin: String,
        value: String,
        reason: String,
    },

    #[error("no marker for {0}")]
    NotOwned(CatalogKey),

    #[error("unsupported marker schema version {version} in {path}")]
    MarkerSchema { path: PathBuf, version: u32 },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Catalog or profile defects: no partial run is meaningful.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownStrategy(_)
                | Self::UnknownProfile(_)
                | Self::ProfileReferencesUnknownKey { .. }
                | Self::InvalidCatalog(_)
        )
    }
}

/// How far a strategy failure reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Only this step is skipped; the entry and the run continue.
    Skippable,
    /// This entry fails; other entries continue.
    EntryFatal,
    /// A shared prerequisite failed; every dependent entry fails.
    RunFatal,
}

#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    /// A shared prerequisite (repository registration, index refresh) failed.
    #[error("prerequisite {what} failed: {message}")]
    Prerequisite { what: String, message: String },

    /// None of the requested packages has an install candidate.
    #[error("no installable candidate for {}", packages.join(", "))]
    Unavailable { packages: Vec<String> },

    #[error(transparent)]
    Package(#[from] aptkit::Error),

    #[error(transparent)]
    Release(#[from] toolchain::Error),

    #[error("{command} failed: {message}")]
    Command { command: String, message: String },

    #[error("installer for user {user} failed: {message}")]
    UserInstall { user: String, message: String },

    #[error("no invoking user: per-user installs need a non-root user (set [user] name)")]
    NoTargetUser,

    #[error("strategy parameters missing for {0}")]
    MissingParams(CatalogKey),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StrategyError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn command(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::Prerequisite { .. } => Severity::RunFatal,
            Self::Unavailable { .. } => Severity::Skippable,
            Self::Package(e) if e.category() == aptkit::ErrorCategory::NotFound => {
                Severity::Skippable
            }
            _ => Severity::EntryFatal,
        }
    }

    /// Checksum mismatch on a downloaded artifact.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Release(e) if e.is_integrity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_taxonomy() {
        let prereq = StrategyError::Prerequisite {
            what: "repository kubernetes".into(),
            message: "404".into(),
        };
        assert_eq!(prereq.severity(), Severity::RunFatal);

        let unavailable = StrategyError::Unavailable {
            packages: vec!["no-such-package-xyz".into()],
        };
        assert_eq!(unavailable.severity(), Severity::Skippable);

        let mismatch = StrategyError::Release(toolchain::Error::ChecksumMismatch {
            file: "helm.tar.gz".into(),
            expected: "a".into(),
            actual: "b".into(),
        });
        assert_eq!(mismatch.severity(), Severity::EntryFatal);
        assert!(mismatch.is_integrity());

        let user = StrategyError::UserInstall {
            user: "alice".into(),
            message: "nvm install failed".into(),
        };
        assert_eq!(user.severity(), Severity::EntryFatal);
        assert!(!user.is_integrity());
    }

    #[test]
    fn test_config_errors() {
        assert!(Error::UnknownProfile("x".into()).is_config_error());
        assert!(Error::UnknownStrategy("x".into()).is_config_error());
        assert!(!Error::UnknownPin("X".into()).is_config_error());
    }

    #[test]
    fn test_unavailable_display() {
        let err = StrategyError::Unavailable {
            packages: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "no installable candidate for a, b");
    }
}
