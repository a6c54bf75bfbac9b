//! Backend abstraction for native package manager operations.
//!
//! The [`Backend`] trait is the whole boundary to apt: refresh the index,
//! check candidates, install a set, remove a set, autoremove orphans, and
//! answer presence queries. Exit status is the only success signal.

pub mod apt;
pub mod mock;

pub use apt::AptBackend;
pub use mock::MockBackend;

use crate::error::Result;
use crate::types::{CandidateFilter, InstalledPackage};

/// Backend trait for native package manager operations.
///
/// This trait abstracts the package manager, enabling:
/// - Real CLI execution via `apt-get`/`apt-cache`/`dpkg-query`
/// - In-memory implementations for testing
pub trait Backend: Send + Sync {
    /// Check if the package manager is available on this host.
    fn is_available(&self) -> bool;

    /// Refresh the package index (`apt-get update`).
    fn refresh_index(&self) -> Result<()>;

    /// Whether a package has an installable candidate.
    fn has_candidate(&self, name: &str) -> Result<bool>;

    /// Query the installed state of a package.
    fn query(&self, name: &str) -> Result<Option<InstalledPackage>>;

    /// Install a set of packages in one transaction.
    fn install(&self, packages: &[String]) -> Result<()>;

    /// Remove a set of packages in one transaction.
    fn remove(&self, packages: &[String]) -> Result<()>;

    /// Remove dependencies nothing depends on anymore.
    fn autoremove(&self) -> Result<()>;

    /// Check if a package is installed.
    fn is_installed(&self, name: &str) -> Result<bool> {
        Ok(self.query(name)?.is_some())
    }

    /// Split packages into installable and unavailable, preserving order.
    fn filter_installable(&self, packages: &[String]) -> Result<CandidateFilter> {
        let mut filter = CandidateFilter::default();
        for name in packages {
            if self.has_candidate(name)? {
                filter.installable.push(name.clone());
            } else {
                filter.unavailable.push(name.clone());
            }
        }
        Ok(filter)
    }

    /// Return the subset of packages that are not installed.
    fn missing(&self, packages: &[String]) -> Result<Vec<String>> {
        let mut missing = Vec::new();
        for name in packages {
            if !self.is_installed(name)? {
                missing.push(name.clone());
            }
        }
        Ok(missing)
    }
}

/// Stand-in for hosts without apt.
///
/// Presence queries answer "not installed"; every mutation fails with
/// [`Error::AptNotFound`](crate::Error::AptNotFound). Lets read-only
/// front-end commands run on any host.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unavailable;

impl Backend for Unavailable {
    fn is_available(&self) -> bool {
        false
    }

    fn refresh_index(&self) -> Result<()> {
        Err(crate::Error::AptNotFound)
    }

    fn has_candidate(&self, _name: &str) -> Result<bool> {
        Ok(false)
    }

    fn query(&self, _name: &str) -> Result<Option<InstalledPackage>> {
        Ok(None)
    }

    fn install(&self, _packages: &[String]) -> Result<()> {
        Err(crate::Error::AptNotFound)
    }

    fn remove(&self, _packages: &[String]) -> Result<()> {
        Err(crate::Error::AptNotFound)
    }

    fn autoremove(&self) -> Result<()> {
        Err(crate::Error::AptNotFound)
    }
}

/// The real apt backend when apt-get exists, otherwise [`Unavailable`].
pub fn detect() -> Box<dyn Backend> {
    match AptBackend::new() {
        Ok(apt) => Box::new(apt),
        Err(e) => {
            log::debug!("{e}");
            Box::new(Unavailable)
        }
    }
}
