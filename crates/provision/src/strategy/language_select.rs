//! Python target selection
//!
//! `PYTHON_TARGET` picks the distro interpreter (`system`), a per-user
//! pyenv (`pyenv`), or a specific minor release from the deadsnakes PPA
//! (`3.N`). Removal is a no-op: whatever packages were pulled in are plain
//! distro packages.

use std::fs;

use crate::catalog::{CatalogEntry, LanguageSelectSpec, RuntimeManagerKind, StrategyParams};
use crate::context::StrategyContext;
use crate::error::{StrategyError, StrategyResult};
use crate::host::CommandSpec;
use crate::ledger::ArtifactSnapshot;
use crate::pins::VersionPins;
use crate::types::StrategyTag;

use super::native::{audit_packages, install_packages, packages_present};
use super::{AuditFinding, InstallReport, Installer, entry_pin};

pub struct LanguageSelect;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    System,
    Pyenv,
    Versioned(String),
}

impl Target {
    fn parse(value: &str) -> Self {
        match value {
            "system" => Self::System,
            "pyenv" => Self::Pyenv,
            version => Self::Versioned(version.to_string()),
        }
    }
}

fn spec(entry: &CatalogEntry) -> StrategyResult<&LanguageSelectSpec> {
    match &entry.params {
        StrategyParams::LanguageSelect(spec) => Ok(spec),
        _ => Err(StrategyError::MissingParams(entry.key.clone())),
    }
}

fn versioned_packages(spec: &LanguageSelectSpec, version: &str) -> Vec<String> {
    spec.versioned_packages
        .iter()
        .map(|template| template.replace("{version}", version))
        .collect()
}

/// Whether any source list already references the PPA.
fn ppa_registered(spec: &LanguageSelectSpec, ctx: &StrategyContext) -> bool {
    let Ok(entries) = fs::read_dir(&ctx.paths.sources_dir) else {
        return false;
    };
    entries.filter_map(Result::ok).any(|entry| {
        fs::read_to_string(entry.path()).is_ok_and(|text| text.contains(&spec.ppa_marker))
    })
}

fn ensure_ppa(spec: &LanguageSelectSpec, ctx: &StrategyContext) -> StrategyResult<()> {
    if ppa_registered(spec, ctx) {
        log::debug!("{} already registered", spec.ppa);
        return Ok(());
    }
    let prerequisite = |message: String| StrategyError::Prerequisite {
        what: spec.ppa.clone(),
        message,
    };
    ctx.system
        .run_checked(&CommandSpec::new("add-apt-repository").args(["-y", spec.ppa.as_str()]))
        .map_err(|e| prerequisite(e.to_string()))?;
    ctx.packages
        .refresh_index()
        .map_err(|e| prerequisite(e.to_string()))?;
    log::info!("registered {}", spec.ppa);
    Ok(())
}

fn with_target(report: InstallReport, target: &str) -> InstallReport {
    match report {
        InstallReport::Installed { snapshot, warnings } => InstallReport::Installed {
            snapshot: ArtifactSnapshot::LanguageSelect {
                target: target.to_string(),
                packages: snapshot.packages().to_vec(),
            },
            warnings,
        },
        other => other,
    }
}

impl Installer for LanguageSelect {
    fn tag(&self) -> StrategyTag {
        StrategyTag::LanguageVersionSelect
    }

    fn install(
        &self,
        entry: &CatalogEntry,
        pins: &VersionPins,
        ctx: &StrategyContext,
    ) -> StrategyResult<InstallReport> {
        let spec = spec(entry)?;
        let pin = entry_pin(entry, pins);
        match Target::parse(pin) {
            Target::System => Ok(with_target(install_packages(&spec.system_packages, ctx)?, pin)),
            Target::Pyenv => {
                let user = ctx.require_user()?;
                let dir = user.home.join(RuntimeManagerKind::Pyenv.dir_name());
                if dir.is_dir() {
                    Ok(InstallReport::AlreadyPresent {
                        detail: format!("python comes from pyenv at {}", dir.display()),
                    })
                } else {
                    Err(StrategyError::Prerequisite {
                        what: "pyenv".to_string(),
                        message: format!("not installed for {}; select the pyenv entry", user.name),
                    })
                }
            }
            Target::Versioned(version) => {
                let packages = versioned_packages(spec, &version);
                if ctx.packages.missing(&packages)?.is_empty() {
                    return Ok(InstallReport::AlreadyPresent {
                        detail: format!("already installed: {}", packages.join(", ")),
                    });
                }
                ensure_ppa(spec, ctx)?;
                Ok(with_target(install_packages(&packages, ctx)?, pin))
            }
        }
    }

    fn remove(
        &self,
        entry: &CatalogEntry,
        _snapshot: &ArtifactSnapshot,
        _ctx: &StrategyContext,
    ) -> StrategyResult<()> {
        log::info!("{}: leaving interpreter packages in place", entry.key);
        Ok(())
    }

    fn verify(
        &self,
        entry: &CatalogEntry,
        snapshot: &ArtifactSnapshot,
        pins: &VersionPins,
        ctx: &StrategyContext,
    ) -> StrategyResult<bool> {
        let ArtifactSnapshot::LanguageSelect { target, packages } = snapshot else {
            return Ok(false);
        };
        Ok(target == entry_pin(entry, pins) && packages_present(packages, ctx)?)
    }

    fn audit(&self, entry: &CatalogEntry, pins: &VersionPins, ctx: &StrategyContext) -> AuditFinding {
        let spec = match spec(entry) {
            Ok(spec) => spec,
            Err(e) => return AuditFinding::unknown(e.to_string()),
        };
        match Target::parse(entry_pin(entry, pins)) {
            Target::System => audit_packages(&spec.system_packages, ctx),
            Target::Versioned(version) => audit_packages(&versioned_packages(spec, &version), ctx),
            Target::Pyenv => match ctx.user.as_ref() {
                None => AuditFinding::unknown("no target user to check"),
                Some(user) => {
                    let dir = user.home.join(RuntimeManagerKind::Pyenv.dir_name());
                    if dir.is_dir() {
                        AuditFinding::ok(format!("pyenv at {}", dir.display()))
                    } else {
                        AuditFinding::missing(format!("{} not found", dir.display()))
                    }
                }
            },
        }
    }
}
