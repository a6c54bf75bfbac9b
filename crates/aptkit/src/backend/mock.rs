//! In-memory backend for testing without touching the host.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::types::InstalledPackage;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// A package manager call recorded by [`MockBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    /// `apt-get update`
    Refresh,
    /// `apt-get install` with the given set
    Install(Vec<String>),
    /// `apt-get remove` with the given set
    Remove(Vec<String>),
    /// `apt-get autoremove`
    Autoremove,
}

#[derive(Debug, Default)]
struct MockState {
    available: BTreeSet<String>,
    installed: BTreeMap<String, String>,
    /// Packages that report success on install but never land (broken postinst).
    phantom: BTreeSet<String>,
    fail_refresh: bool,
    fail_install: bool,
    transactions: Vec<Transaction>,
}

/// Mock backend storing packages in memory.
///
/// Clones share state, so a test can keep a handle while the engine owns
/// another one.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// Create a new empty mock backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend where the given packages have install candidates.
    pub fn with_available<I, S>(packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mock = Self::new();
        for name in packages {
            mock.add_available(name);
        }
        mock
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Make a package installable.
    pub fn add_available(&self, name: impl Into<String>) {
        self.lock().available.insert(name.into());
    }

    /// Mark a package as already installed (pre-existing system package).
    pub fn add_installed(&self, name: impl Into<String>) {
        let name = name.into();
        let mut state = self.lock();
        state.available.insert(name.clone());
        state.installed.insert(name, "1.0-mock".to_string());
    }

    /// Remove a package behind the engine's back (simulates drift).
    pub fn uninstall_out_of_band(&self, name: &str) {
        self.lock().installed.remove(name);
    }

    /// Make a package install "succeed" without actually landing.
    pub fn add_phantom(&self, name: impl Into<String>) {
        let name = name.into();
        let mut state = self.lock();
        state.available.insert(name.clone());
        state.phantom.insert(name);
    }

    /// Make `refresh_index` fail with a network error.
    pub fn fail_refresh(&self, fail: bool) {
        self.lock().fail_refresh = fail;
    }

    /// Make `install` fail with a generic command error.
    pub fn fail_install(&self, fail: bool) {
        self.lock().fail_install = fail;
    }

    /// All recorded transactions, oldest first.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.lock().transactions.clone()
    }

    /// Forget recorded transactions.
    pub fn clear_transactions(&self) {
        self.lock().transactions.clear();
    }

    /// Names of currently installed packages.
    pub fn installed(&self) -> Vec<String> {
        self.lock().installed.keys().cloned().collect()
    }
}

impl Backend for MockBackend {
    fn is_available(&self) -> bool {
        true
    }

    fn refresh_index(&self) -> Result<()> {
        let mut state = self.lock();
        state.transactions.push(Transaction::Refresh);
        if state.fail_refresh {
            return Err(Error::Network {
                message: "Temporary failure resolving 'mirror.mock'".to_string(),
            });
        }
        Ok(())
    }

    fn has_candidate(&self, name: &str) -> Result<bool> {
        Ok(self.lock().available.contains(name))
    }

    fn query(&self, name: &str) -> Result<Option<InstalledPackage>> {
        Ok(self.lock().installed.get(name).map(|version| InstalledPackage {
            name: name.to_string(),
            version: version.clone(),
        }))
    }

    fn install(&self, packages: &[String]) -> Result<()> {
        let mut state = self.lock();
        state
            .transactions
            .push(Transaction::Install(packages.to_vec()));
        if state.fail_install {
            return Err(Error::CommandFailed {
                message: "apt-get install".to_string(),
                stderr: "E: Sub-process /usr/bin/dpkg returned an error code (1)".to_string(),
            });
        }
        if let Some(missing) = packages.iter().find(|p| !state.available.contains(*p)) {
            return Err(Error::NotFound {
                name: missing.clone(),
            });
        }
        for name in packages {
            if !state.phantom.contains(name) {
                state.installed.insert(name.clone(), "1.0-mock".to_string());
            }
        }
        Ok(())
    }

    fn remove(&self, packages: &[String]) -> Result<()> {
        let mut state = self.lock();
        state.transactions.push(Transaction::Remove(packages.to_vec()));
        for name in packages {
            state.installed.remove(name);
        }
        Ok(())
    }

    fn autoremove(&self) -> Result<()> {
        self.lock().transactions.push(Transaction::Autoremove);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_and_query() {
        let mock = MockBackend::with_available(["curl", "jq"]);
        mock.install(&["curl".to_string()]).unwrap();

        assert!(mock.is_installed("curl").unwrap());
        assert!(!mock.is_installed("jq").unwrap());
        assert_eq!(
            mock.transactions(),
            vec![Transaction::Install(vec!["curl".to_string()])]
        );
    }

    #[test]
    fn test_filter_installable_preserves_order() {
        let mock = MockBackend::with_available(["curl", "jq"]);
        let packages = vec![
            "curl".to_string(),
            "no-such-package-xyz".to_string(),
            "jq".to_string(),
        ];
        let filter = mock.filter_installable(&packages).unwrap();
        assert_eq!(filter.installable, vec!["curl", "jq"]);
        assert_eq!(filter.unavailable, vec!["no-such-package-xyz"]);
    }

    #[test]
    fn test_install_unknown_package_fails_whole_transaction() {
        let mock = MockBackend::with_available(["curl"]);
        let err = mock
            .install(&["curl".to_string(), "nope".to_string()])
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert!(!mock.is_installed("curl").unwrap());
    }

    #[test]
    fn test_phantom_package_never_lands() {
        let mock = MockBackend::new();
        mock.add_phantom("broken");
        mock.install(&["broken".to_string()]).unwrap();
        assert!(!mock.is_installed("broken").unwrap());
    }

    #[test]
    fn test_clones_share_state() {
        let mock = MockBackend::with_available(["curl"]);
        let handle = mock.clone();
        mock.install(&["curl".to_string()]).unwrap();
        assert_eq!(handle.installed(), vec!["curl"]);
    }
}
