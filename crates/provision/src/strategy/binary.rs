//! Standalone release binaries (Terraform, Helm, SOPS)
//!
//! Downloads go through [`toolchain::Client`], which verifies the published
//! checksum before anything is written. A binary already reporting the
//! resolved version is left alone.

use std::path::{Path, PathBuf};

use toolchain::types::{normalize_version, parse_version_output};
use toolchain::{InstallOptions, Tool};

use crate::catalog::{CatalogEntry, StrategyParams};
use crate::context::StrategyContext;
use crate::error::{StrategyError, StrategyResult};
use crate::host::CommandSpec;
use crate::ledger::ArtifactSnapshot;
use crate::pins::{LATEST, VersionPins};
use crate::types::StrategyTag;

use super::{AuditFinding, InstallReport, Installer, entry_pin};

pub struct StandaloneBinary;

fn tool(entry: &CatalogEntry) -> StrategyResult<Tool> {
    match &entry.params {
        StrategyParams::Binary { tool } => Ok(*tool),
        _ => Err(StrategyError::MissingParams(entry.key.clone())),
    }
}

fn install_path(tool: Tool, ctx: &StrategyContext) -> PathBuf {
    ctx.paths.bin_dir.join(tool.binary_name())
}

/// Our install path if it exists, otherwise whatever is on PATH.
fn locate(tool: Tool, ctx: &StrategyContext) -> Option<PathBuf> {
    let ours = install_path(tool, ctx);
    if ours.is_file() {
        Some(ours)
    } else {
        ctx.system.which(tool.binary_name())
    }
}

fn reported_version(tool: Tool, path: &Path, ctx: &StrategyContext) -> Option<String> {
    let cmd = CommandSpec::new(path.to_string_lossy()).args(tool.version_args().iter().copied());
    let output = ctx.system.run(&cmd).ok()?;
    if !output.success {
        return None;
    }
    parse_version_output(&output.stdout_str())
}

/// The located binary, if it already reports `version`.
fn matching(tool: Tool, version: &str, ctx: &StrategyContext) -> Option<PathBuf> {
    locate(tool, ctx).filter(|path| reported_version(tool, path, ctx).as_deref() == Some(version))
}

impl Installer for StandaloneBinary {
    fn tag(&self) -> StrategyTag {
        StrategyTag::StandaloneBinary
    }

    fn install(
        &self,
        entry: &CatalogEntry,
        pins: &VersionPins,
        ctx: &StrategyContext,
    ) -> StrategyResult<InstallReport> {
        let tool = tool(entry)?;
        let version = ctx.releases.resolve_version(tool, entry_pin(entry, pins))?;

        if let Some(existing) = matching(tool, &version, ctx) {
            return Ok(InstallReport::AlreadyPresent {
                detail: format!("{tool} {version} already at {}", existing.display()),
            });
        }

        let mut options = InstallOptions::new(&ctx.paths.bin_dir);
        if let Some(platform) = &ctx.platform {
            options = options.platform(platform.clone());
        }
        let result = ctx.releases.install(tool, &version, &options)?;
        log::info!(
            "{} {tool} {} to {}",
            if result.was_upgrade { "replaced" } else { "installed" },
            result.version,
            result.path.display()
        );

        Ok(InstallReport::installed(ArtifactSnapshot::Binary {
            path: result.path,
            version: result.version,
            sha256: result.sha256,
        }))
    }

    fn would_install(
        &self,
        entry: &CatalogEntry,
        pins: &VersionPins,
        ctx: &StrategyContext,
    ) -> StrategyResult<bool> {
        let tool = tool(entry)?;
        let version = ctx.releases.resolve_version(tool, entry_pin(entry, pins))?;
        Ok(matching(tool, &version, ctx).is_none())
    }

    fn remove(
        &self,
        entry: &CatalogEntry,
        snapshot: &ArtifactSnapshot,
        ctx: &StrategyContext,
    ) -> StrategyResult<()> {
        let ArtifactSnapshot::Binary { path, .. } = snapshot else {
            return Err(StrategyError::MissingParams(entry.key.clone()));
        };
        if !ctx.releases.remove(path)? {
            log::debug!("{} already absent", path.display());
        }
        Ok(())
    }

    fn verify(
        &self,
        entry: &CatalogEntry,
        snapshot: &ArtifactSnapshot,
        pins: &VersionPins,
        ctx: &StrategyContext,
    ) -> StrategyResult<bool> {
        let ArtifactSnapshot::Binary {
            path,
            version,
            sha256,
        } = snapshot
        else {
            return Ok(false);
        };
        if ctx.releases.file_digest(path)?.as_deref() != Some(sha256.as_str()) {
            return Ok(false);
        }
        let pin = entry_pin(entry, pins);
        Ok(pin == LATEST || normalize_version(pin) == *version)
    }

    fn audit(&self, entry: &CatalogEntry, pins: &VersionPins, ctx: &StrategyContext) -> AuditFinding {
        let tool = match tool(entry) {
            Ok(tool) => tool,
            Err(e) => return AuditFinding::unknown(e.to_string()),
        };
        let Some(path) = locate(tool, ctx) else {
            return AuditFinding::missing(format!("{} not found", tool.binary_name()));
        };
        let Some(version) = reported_version(tool, &path, ctx) else {
            return AuditFinding::unknown(format!(
                "{} present but version unreadable",
                path.display()
            ));
        };
        let pin = entry_pin(entry, pins);
        if pin != LATEST && normalize_version(pin) != version {
            return AuditFinding::missing(format!("{tool} {version} at {}, pinned {pin}", path.display()));
        }
        AuditFinding::ok(format!("{tool} {version} at {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::CommandOutput;
    use crate::pins::Pin;
    use crate::strategy::AuditStatus;
    use crate::strategy::testing::Harness;
    use std::fs;
    use toolchain::checksum::sha256_hex;

    const ARTIFACT: &str =
        "https://github.com/getsops/sops/releases/download/v3.9.0/sops-v3.9.0.linux.amd64";
    const MANIFEST: &str =
        "https://github.com/getsops/sops/releases/download/v3.9.0/sops-v3.9.0.checksums.txt";

    fn sops() -> CatalogEntry {
        CatalogEntry::new("sops", "SOPS", StrategyTag::StandaloneBinary)
            .pin(Pin::SopsVersion)
            .params(StrategyParams::Binary { tool: Tool::Sops })
    }

    fn harness(binary: &[u8], published: &[u8]) -> Harness {
        let h = Harness::new();
        h.releases.set_latest("getsops/sops", "v3.9.0");
        h.releases.add_file(ARTIFACT, binary.to_vec());
        h.releases.add_file(
            MANIFEST,
            format!("{}  sops-v3.9.0.linux.amd64\n", sha256_hex(published)).into_bytes(),
        );
        h
    }

    #[test]
    fn test_install_latest() {
        let h = harness(b"sops-bin", b"sops-bin");
        let ctx = h.ctx();
        let pins = VersionPins::defaults();

        let report = StandaloneBinary.install(&sops(), &pins, &ctx).unwrap();
        let InstallReport::Installed { snapshot, .. } = report else {
            panic!("expected an install");
        };
        assert_eq!(
            snapshot,
            ArtifactSnapshot::Binary {
                path: h.root().join("bin/sops"),
                version: "3.9.0".into(),
                sha256: sha256_hex(b"sops-bin"),
            }
        );
        assert!(StandaloneBinary.verify(&sops(), &snapshot, &pins, &ctx).unwrap());
    }

    #[test]
    fn test_checksum_mismatch_is_entry_fatal() {
        let h = harness(b"tampered", b"sops-bin");
        let err = StandaloneBinary
            .install(&sops(), &VersionPins::defaults(), &h.ctx())
            .unwrap_err();
        assert!(err.is_integrity());
        assert!(!h.root().join("bin/sops").exists());
    }

    #[test]
    fn test_skips_download_when_version_matches() {
        let h = harness(b"sops-bin", b"sops-bin");
        fs::write(h.root().join("bin/sops"), b"sops-bin").unwrap();
        h.system.respond("sops --version", CommandOutput::ok("sops 3.9.0 (latest)\n"));

        let report = StandaloneBinary
            .install(&sops(), &VersionPins::defaults(), &h.ctx())
            .unwrap();
        assert!(matches!(report, InstallReport::AlreadyPresent { .. }));
        assert!(!h.releases.requests().iter().any(|u| u == ARTIFACT));
    }

    #[test]
    fn test_verify_detects_pin_change_and_tampering() {
        let h = harness(b"sops-bin", b"sops-bin");
        let ctx = h.ctx();
        let mut pins = VersionPins::defaults();
        let InstallReport::Installed { snapshot, .. } =
            StandaloneBinary.install(&sops(), &pins, &ctx).unwrap()
        else {
            panic!("expected an install");
        };

        pins.set(Pin::SopsVersion, "v3.9.0").unwrap();
        assert!(StandaloneBinary.verify(&sops(), &snapshot, &pins, &ctx).unwrap());
        pins.set(Pin::SopsVersion, "3.8.1").unwrap();
        assert!(!StandaloneBinary.verify(&sops(), &snapshot, &pins, &ctx).unwrap());

        pins.set(Pin::SopsVersion, "latest").unwrap();
        fs::write(h.root().join("bin/sops"), b"replaced").unwrap();
        assert!(!StandaloneBinary.verify(&sops(), &snapshot, &pins, &ctx).unwrap());
    }

    #[test]
    fn test_remove_is_safe_when_absent() {
        let h = Harness::new();
        let snapshot = ArtifactSnapshot::Binary {
            path: h.root().join("bin/sops"),
            version: "3.9.0".into(),
            sha256: String::new(),
        };
        StandaloneBinary.remove(&sops(), &snapshot, &h.ctx()).unwrap();
    }

    #[test]
    fn test_would_install_compares_resolved_version() {
        let h = harness(b"sops-bin", b"sops-bin");
        let ctx = h.ctx();
        let pins = VersionPins::defaults();
        assert!(StandaloneBinary.would_install(&sops(), &pins, &ctx).unwrap());

        h.system.add_binary("sops");
        h.system.respond("sops --version", CommandOutput::ok("sops 3.8.1\n"));
        assert_eq!(StandaloneBinary.audit(&sops(), &pins, &ctx).status, AuditStatus::Ok);
        assert!(StandaloneBinary.would_install(&sops(), &pins, &ctx).unwrap());

        h.system.respond("sops --version", CommandOutput::ok("sops 3.9.0\n"));
        assert!(!StandaloneBinary.would_install(&sops(), &pins, &ctx).unwrap());
        assert!(h.releases.requests().is_empty());
    }

    #[test]
    fn test_audit() {
        let h = Harness::new();
        let ctx = h.ctx();
        let mut pins = VersionPins::defaults();
        assert_eq!(StandaloneBinary.audit(&sops(), &pins, &ctx).status, AuditStatus::Missing);

        fs::write(h.root().join("bin/sops"), b"x").unwrap();
        h.system.respond("sops --version", CommandOutput::ok("sops 3.9.0\n"));
        assert_eq!(StandaloneBinary.audit(&sops(), &pins, &ctx).status, AuditStatus::Ok);

        pins.set(Pin::SopsVersion, "3.8.1").unwrap();
        assert_eq!(StandaloneBinary.audit(&sops(), &pins, &ctx).status, AuditStatus::Missing);
    }
}
