//! Install/remove strategies
//!
//! Each catalog entry names a [`StrategyTag`]; the [`StrategyRegistry`] maps
//! tags to [`Installer`] implementations. Lookup through the registry is the
//! only place an unknown strategy can surface.

pub mod binary;
pub mod language_select;
pub mod native;
pub mod runtime_manager;
pub mod script;
pub mod vendor_repo;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::catalog::CatalogEntry;
use crate::context::StrategyContext;
use crate::error::{Error, Result, StrategyError, StrategyResult};
use crate::ledger::ArtifactSnapshot;
use crate::pins::{LATEST, VersionPins};
use crate::types::StrategyTag;

pub use binary::StandaloneBinary;
pub use language_select::LanguageSelect;
pub use native::NativePackages;
pub use runtime_manager::RuntimeManager;
pub use script::ScriptedInstaller;
pub use vendor_repo::VendorRepository;

/// What an install attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallReport {
    /// The engine put this on the host; the snapshot describes it.
    Installed {
        snapshot: ArtifactSnapshot,
        warnings: Vec<String>,
    },
    /// Something else already satisfied the entry; it is not ours to own.
    AlreadyPresent { detail: String },
    /// Nothing was changed on purpose (audit-only mode).
    Deferred { reason: String },
}

impl InstallReport {
    pub fn installed(snapshot: ArtifactSnapshot) -> Self {
        Self::Installed {
            snapshot,
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditStatus {
    Ok,
    Missing,
    Unknown,
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "OK",
            Self::Missing => "MISSING",
            Self::Unknown => "UNKNOWN",
        })
    }
}

/// Result of checking one entry against the live host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditFinding {
    pub status: AuditStatus,
    pub details: String,
}

impl AuditFinding {
    pub fn ok(details: impl Into<String>) -> Self {
        Self {
            status: AuditStatus::Ok,
            details: details.into(),
        }
    }

    pub fn missing(details: impl Into<String>) -> Self {
        Self {
            status: AuditStatus::Missing,
            details: details.into(),
        }
    }

    pub fn unknown(details: impl Into<String>) -> Self {
        Self {
            status: AuditStatus::Unknown,
            details: details.into(),
        }
    }
}

/// Install/remove behaviour for one strategy tag.
///
/// `install` must be idempotent: an entry that is already correctly in
/// place reports [`InstallReport::AlreadyPresent`] or an unchanged snapshot
/// without repeating side effects.
pub trait Installer: Send + Sync {
    fn tag(&self) -> StrategyTag;

    /// Shared setup that must succeed before the package transaction
    /// (repository registration). Failure fails the entry as a prerequisite.
    fn prepare(&self, _entry: &CatalogEntry, _ctx: &StrategyContext) -> StrategyResult<()> {
        Ok(())
    }

    fn install(
        &self,
        entry: &CatalogEntry,
        pins: &VersionPins,
        ctx: &StrategyContext,
    ) -> StrategyResult<InstallReport>;

    /// Bring an owned install that failed `verify` back in line with the
    /// pins. `snapshot` is what the marker recorded.
    fn reinstall(
        &self,
        entry: &CatalogEntry,
        _snapshot: &ArtifactSnapshot,
        pins: &VersionPins,
        ctx: &StrategyContext,
    ) -> StrategyResult<InstallReport> {
        self.install(entry, pins, ctx)
    }

    /// Whether `install` would change the host for an unowned entry. Must
    /// agree with `install` returning [`InstallReport::AlreadyPresent`];
    /// the planner relies on it.
    fn would_install(
        &self,
        entry: &CatalogEntry,
        pins: &VersionPins,
        ctx: &StrategyContext,
    ) -> StrategyResult<bool> {
        Ok(self.audit(entry, pins, ctx).status != AuditStatus::Ok)
    }

    /// Undo an install using what the marker recorded, not the current catalog.
    fn remove(
        &self,
        entry: &CatalogEntry,
        snapshot: &ArtifactSnapshot,
        ctx: &StrategyContext,
    ) -> StrategyResult<()>;

    /// Whether the snapshot is still present and satisfies the current pins.
    fn verify(
        &self,
        entry: &CatalogEntry,
        snapshot: &ArtifactSnapshot,
        pins: &VersionPins,
        ctx: &StrategyContext,
    ) -> StrategyResult<bool>;

    /// Check the live host without consulting ownership records.
    fn audit(&self, entry: &CatalogEntry, pins: &VersionPins, ctx: &StrategyContext) -> AuditFinding;
}

/// Pin value an entry consults, `latest` when it has none.
pub fn entry_pin<'a>(entry: &CatalogEntry, pins: &'a VersionPins) -> &'a str {
    entry.version_var.map_or(LATEST, |pin| pins.get(pin))
}

/// Write through a sibling temp file and rename, then set `mode`.
pub(crate) fn write_file(path: &Path, contents: &[u8], mode: u32) -> StrategyResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StrategyError::io(parent, e))?;
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{name}.partial"));
    fs::write(&tmp, contents).map_err(|e| StrategyError::io(&tmp, e))?;
    #[cfg(unix)]
    fs::set_permissions(&tmp, fs::Permissions::from_mode(mode))
        .map_err(|e| StrategyError::io(&tmp, e))?;
    #[cfg(not(unix))]
    let _ = mode;
    fs::rename(&tmp, path).map_err(|e| StrategyError::io(path, e))
}

/// Remove a file, treating absence as success. Returns whether it existed.
pub(crate) fn remove_file(path: &Path) -> StrategyResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StrategyError::io(path, e)),
    }
}

pub struct StrategyRegistry {
    installers: BTreeMap<StrategyTag, Box<dyn Installer>>,
}

impl StrategyRegistry {
    pub fn empty() -> Self {
        Self {
            installers: BTreeMap::new(),
        }
    }

    /// All six stock strategies.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(NativePackages));
        registry.register(Box::new(VendorRepository));
        registry.register(Box::new(StandaloneBinary));
        registry.register(Box::new(ScriptedInstaller));
        registry.register(Box::new(RuntimeManager));
        registry.register(Box::new(LanguageSelect));
        registry
    }

    /// Register an installer, replacing any previous one for its tag.
    pub fn register(&mut self, installer: Box<dyn Installer>) {
        self.installers.insert(installer.tag(), installer);
    }

    pub fn get(&self, tag: StrategyTag) -> Result<&dyn Installer> {
        self.installers
            .get(&tag)
            .map(|installer| installer.as_ref())
            .ok_or_else(|| Error::UnknownStrategy(tag.to_string()))
    }

    pub fn tags(&self) -> impl Iterator<Item = StrategyTag> + '_ {
        self.installers.keys().copied()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.installers.keys()).finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Context builder shared by the strategy and reconciler tests.

    use crate::context::{ApplyOptions, HostPaths, StateLayout, StrategyContext, TargetUser};
    use crate::host::mock::FakeSystem;
    use std::path::Path;
    use tempfile::TempDir;

    pub struct Harness {
        pub temp: TempDir,
        pub apt: aptkit::MockBackend,
        pub releases: toolchain::MockBackend,
        pub system: FakeSystem,
    }

    impl Harness {
        pub fn new() -> Self {
            let temp = TempDir::new().unwrap();
            for dir in ["bin", "sources", "keyrings", "state", "home/alice"] {
                std::fs::create_dir_all(temp.path().join(dir)).unwrap();
            }
            std::fs::write(
                temp.path().join("os-release"),
                "NAME=\"Ubuntu\"\nVERSION_CODENAME=noble\n",
            )
            .unwrap();
            Self {
                temp,
                apt: aptkit::MockBackend::new(),
                releases: toolchain::MockBackend::new(),
                system: FakeSystem::new(),
            }
        }

        pub fn root(&self) -> &Path {
            self.temp.path()
        }

        pub fn home(&self) -> std::path::PathBuf {
            self.root().join("home/alice")
        }

        pub fn ctx(&self) -> StrategyContext {
            self.ctx_with(ApplyOptions::default())
        }

        pub fn ctx_with(&self, options: ApplyOptions) -> StrategyContext {
            let root = self.root();
            StrategyContext {
                packages: Box::new(self.apt.clone()),
                releases: toolchain::Client::with_backend(Box::new(self.releases.clone())),
                system: Box::new(self.system.clone()),
                paths: HostPaths {
                    bin_dir: root.join("bin"),
                    sources_dir: root.join("sources"),
                    keyrings_dir: root.join("keyrings"),
                    os_release: root.join("os-release"),
                },
                state: StateLayout::new(root.join("state")),
                user: Some(TargetUser {
                    name: "alice".to_string(),
                    home: self.home(),
                }),
                options,
                platform: Some(toolchain::Platform::new("linux", "amd64")),
            }
        }
    }
}
