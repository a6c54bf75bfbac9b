//! Strategy context and progress reporting
//!
//! [`StrategyContext`] bundles every host boundary a strategy may touch, so
//! the engine can be driven against mocks in tests and the real host in the
//! CLI.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StrategyError;
use crate::host::{CommandSpec, System};
use crate::types::{Action, CatalogKey, EntryOutcome};

/// Files the engine keeps under its state directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn selection_file(&self) -> PathBuf {
        self.root.join("selection.env")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.root.join("backups")
    }

    pub fn markers_dir(&self) -> PathBuf {
        self.root.join("markers")
    }

    /// Installer scripts saved in audit-only mode.
    pub fn scripts_dir(&self) -> PathBuf {
        self.root.join("scripts")
    }

    /// Generated removal scripts.
    pub fn removal_dir(&self) -> PathBuf {
        self.root.join("removal")
    }
}

/// System locations strategies install into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPaths {
    pub bin_dir: PathBuf,
    pub sources_dir: PathBuf,
    pub keyrings_dir: PathBuf,
    pub os_release: PathBuf,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self {
            bin_dir: PathBuf::from("/usr/local/bin"),
            sources_dir: PathBuf::from("/etc/apt/sources.list.d"),
            keyrings_dir: PathBuf::from("/etc/apt/keyrings"),
            os_release: PathBuf::from("/etc/os-release"),
        }
    }
}

/// Switches that change what apply and removal are allowed to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOptions {
    pub autoremove: bool,
    /// Delete vendor repository source lists when their entry is removed.
    pub remove_repositories: bool,
    /// Let removal scripts delete data directories.
    pub purge_data: bool,
    /// Download installer scripts for review without running them.
    pub script_audit_only: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            autoremove: true,
            remove_repositories: false,
            purge_data: false,
            script_audit_only: false,
        }
    }
}

/// The non-root account per-user installs run as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUser {
    pub name: String,
    pub home: PathBuf,
}

pub struct StrategyContext {
    pub packages: Box<dyn aptkit::Backend>,
    pub releases: toolchain::Client,
    pub system: Box<dyn System>,
    pub paths: HostPaths,
    pub state: StateLayout,
    pub user: Option<TargetUser>,
    pub options: ApplyOptions,
    /// Release artifact platform; detected from the host when unset.
    pub platform: Option<toolchain::Platform>,
}

impl StrategyContext {
    pub fn require_user(&self) -> Result<&TargetUser, StrategyError> {
        self.user.as_ref().ok_or(StrategyError::NoTargetUser)
    }

    /// Debian architecture name (`amd64`, `arm64`).
    pub fn dpkg_arch(&self) -> String {
        let cmd = CommandSpec::new("dpkg").arg("--print-architecture");
        if let Ok(output) = self.system.run(&cmd)
            && output.success
        {
            let arch = output.stdout_str().trim().to_string();
            if !arch.is_empty() {
                return arch;
            }
        }
        toolchain::platform::detect().map_or_else(|_| "amd64".to_string(), |p| p.arch)
    }

    /// Release codename from os-release (`VERSION_CODENAME`, else `UBUNTU_CODENAME`).
    pub fn codename(&self) -> Option<String> {
        let text = fs::read_to_string(&self.paths.os_release).ok()?;
        parse_codename(&text)
    }
}

fn parse_codename(os_release: &str) -> Option<String> {
    let lookup = |name: &str| {
        os_release.lines().find_map(|line| {
            let (key, value) = line.split_once('=')?;
            (key.trim() == name)
                .then(|| value.trim().trim_matches('"').to_string())
                .filter(|v| !v.is_empty())
        })
    };
    lookup("VERSION_CODENAME").or_else(|| lookup("UBUNTU_CODENAME"))
}

/// Reconcile phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Repositories,
    RefreshIndex,
    PackageInstall,
    Individual,
    Removal,
    Autoremove,
    Audit,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Repositories => "Registering repositories",
            Self::RefreshIndex => "Refreshing package index",
            Self::PackageInstall => "Installing packages",
            Self::Individual => "Running installers",
            Self::Removal => "Removing deselected items",
            Self::Autoremove => "Removing orphaned dependencies",
            Self::Audit => "Auditing host",
        }
    }
}

/// Progress callback for reconcile runs
pub trait ProgressCallback {
    fn on_phase(&mut self, phase: Phase);
    fn on_entry_start(&mut self, key: &CatalogKey, action: Action);
    fn on_entry_complete(&mut self, outcome: &EntryOutcome);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_phase(&mut self, _phase: Phase) {}
    fn on_entry_start(&mut self, _key: &CatalogKey, _action: Action) {}
    fn on_entry_complete(&mut self, _outcome: &EntryOutcome) {}
}
