//! Distro packages through the native package manager

use crate::catalog::CatalogEntry;
use crate::context::StrategyContext;
use crate::error::{StrategyError, StrategyResult};
use crate::ledger::ArtifactSnapshot;
use crate::pins::VersionPins;
use crate::types::StrategyTag;

use super::{AuditFinding, InstallReport, Installer};

pub struct NativePackages;

impl Installer for NativePackages {
    fn tag(&self) -> StrategyTag {
        StrategyTag::NativePackage
    }

    fn install(
        &self,
        entry: &CatalogEntry,
        _pins: &VersionPins,
        ctx: &StrategyContext,
    ) -> StrategyResult<InstallReport> {
        install_packages(&entry.packages, ctx)
    }

    fn remove(
        &self,
        _entry: &CatalogEntry,
        snapshot: &ArtifactSnapshot,
        ctx: &StrategyContext,
    ) -> StrategyResult<()> {
        remove_packages(snapshot.packages(), ctx)
    }

    fn verify(
        &self,
        _entry: &CatalogEntry,
        snapshot: &ArtifactSnapshot,
        _pins: &VersionPins,
        ctx: &StrategyContext,
    ) -> StrategyResult<bool> {
        packages_present(snapshot.packages(), ctx)
    }

    fn audit(&self, entry: &CatalogEntry, _pins: &VersionPins, ctx: &StrategyContext) -> AuditFinding {
        audit_packages(&entry.packages, ctx)
    }
}

/// Install whichever of `packages` are missing, skipping ones with no
/// candidate. The snapshot lists only what this call installed.
pub fn install_packages(packages: &[String], ctx: &StrategyContext) -> StrategyResult<InstallReport> {
    let missing = ctx.packages.missing(packages)?;
    if missing.is_empty() {
        return Ok(InstallReport::AlreadyPresent {
            detail: format!("already installed: {}", packages.join(", ")),
        });
    }

    let filter = ctx.packages.filter_installable(&missing)?;
    if filter.installable.is_empty() {
        return Err(StrategyError::Unavailable {
            packages: filter.unavailable,
        });
    }
    let warnings = unavailable_warnings(&filter.unavailable);
    ctx.packages.install(&filter.installable)?;

    Ok(InstallReport::Installed {
        snapshot: ArtifactSnapshot::Packages {
            packages: filter.installable,
        },
        warnings,
    })
}

/// Remove the installed subset of `packages`.
pub fn remove_packages(packages: &[String], ctx: &StrategyContext) -> StrategyResult<()> {
    let mut present = Vec::new();
    for name in packages {
        if ctx.packages.is_installed(name)? {
            present.push(name.clone());
        }
    }
    if present.is_empty() {
        log::debug!("nothing to remove from {}", packages.join(", "));
        return Ok(());
    }
    ctx.packages.remove(&present)?;
    Ok(())
}

pub fn packages_present(packages: &[String], ctx: &StrategyContext) -> StrategyResult<bool> {
    Ok(ctx.packages.missing(packages)?.is_empty())
}

pub fn audit_packages(packages: &[String], ctx: &StrategyContext) -> AuditFinding {
    match ctx.packages.missing(packages) {
        Ok(missing) if missing.is_empty() => AuditFinding::ok(format!("installed: {}", packages.join(", "))),
        Ok(missing) => AuditFinding::missing(format!("not installed: {}", missing.join(", "))),
        Err(e) => AuditFinding::unknown(format!("package query failed: {e}")),
    }
}

pub(crate) fn unavailable_warnings(unavailable: &[String]) -> Vec<String> {
    unavailable
        .iter()
        .map(|name| {
            log::warn!("skipping {name}: no installable candidate");
            format!("skipped {name}: no installable candidate")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::AuditStatus;
    use crate::strategy::testing::Harness;
    use aptkit::backend::mock::Transaction;

    fn entry(packages: &[&str]) -> CatalogEntry {
        CatalogEntry::new("tools", "Tools", StrategyTag::NativePackage).packages(packages)
    }

    #[test]
    fn test_install_records_only_what_was_missing() {
        let h = Harness::new();
        h.apt.add_installed("curl");
        h.apt.add_available("jq");
        let ctx = h.ctx();

        let report = NativePackages
            .install(&entry(&["curl", "jq"]), &VersionPins::defaults(), &ctx)
            .unwrap();
        assert_eq!(
            report,
            InstallReport::installed(ArtifactSnapshot::Packages {
                packages: vec!["jq".into()]
            })
        );
    }

    #[test]
    fn test_install_already_present() {
        let h = Harness::new();
        h.apt.add_installed("curl");
        let report = NativePackages
            .install(&entry(&["curl"]), &VersionPins::defaults(), &h.ctx())
            .unwrap();
        assert!(matches!(report, InstallReport::AlreadyPresent { .. }));
        assert!(h.apt.transactions().is_empty());
    }

    #[test]
    fn test_install_skips_unavailable_with_warning() {
        let h = Harness::new();
        h.apt.add_available("jq");
        let report = NativePackages
            .install(&entry(&["jq", "no-such-package-xyz"]), &VersionPins::defaults(), &h.ctx())
            .unwrap();
        let InstallReport::Installed { warnings, .. } = report else {
            panic!("expected an install");
        };
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("no-such-package-xyz"));
        assert_eq!(
            h.apt.transactions(),
            vec![Transaction::Install(vec!["jq".into()])]
        );
    }

    #[test]
    fn test_install_nothing_available() {
        let h = Harness::new();
        let err = NativePackages
            .install(&entry(&["no-such-package-xyz"]), &VersionPins::defaults(), &h.ctx())
            .unwrap_err();
        assert!(matches!(err, StrategyError::Unavailable { .. }));
    }

    #[test]
    fn test_remove_uses_snapshot_not_catalog() {
        let h = Harness::new();
        h.apt.add_installed("jq");
        h.apt.add_installed("curl");
        let snapshot = ArtifactSnapshot::Packages {
            packages: vec!["jq".into(), "gone-already".into()],
        };
        NativePackages
            .remove(&entry(&["curl", "jq"]), &snapshot, &h.ctx())
            .unwrap();
        assert_eq!(h.apt.installed(), vec!["curl".to_string()]);
        assert_eq!(
            h.apt.transactions(),
            vec![Transaction::Remove(vec!["jq".into()])]
        );
    }

    #[test]
    fn test_audit() {
        let h = Harness::new();
        h.apt.add_installed("curl");
        let ctx = h.ctx();
        let pins = VersionPins::defaults();
        assert_eq!(NativePackages.audit(&entry(&["curl"]), &pins, &ctx).status, AuditStatus::Ok);
        let finding = NativePackages.audit(&entry(&["curl", "jq"]), &pins, &ctx);
        assert_eq!(finding.status, AuditStatus::Missing);
        assert!(finding.details.contains("jq"));
    }
}
