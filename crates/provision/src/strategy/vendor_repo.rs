//! Third-party apt repositories
//!
//! Registration writes a keyring and a one-line source list. It is skipped
//! when the keyring exists and the list already holds the exact line, so
//! repeated applies never rewrite either file.

use std::fs;
use std::path::PathBuf;

use crate::catalog::{CatalogEntry, RepositorySpec, StrategyParams};
use crate::context::StrategyContext;
use crate::error::{StrategyError, StrategyResult};
use crate::host::CommandSpec;
use crate::ledger::ArtifactSnapshot;
use crate::pins::VersionPins;
use crate::types::StrategyTag;

use super::native::{audit_packages, install_packages, packages_present, remove_packages};
use super::{AuditFinding, InstallReport, Installer, remove_file, write_file};

const ARMOR_HEADER: &[u8] = b"-----BEGIN PGP";

pub struct VendorRepository;

fn repository(entry: &CatalogEntry) -> StrategyResult<&RepositorySpec> {
    match &entry.params {
        StrategyParams::VendorRepository(spec) => Ok(spec),
        _ => Err(StrategyError::MissingParams(entry.key.clone())),
    }
}

struct Layout {
    keyring: PathBuf,
    list: PathBuf,
}

fn layout(spec: &RepositorySpec, ctx: &StrategyContext) -> Layout {
    Layout {
        keyring: ctx.paths.keyrings_dir.join(&spec.keyring_file),
        list: ctx.paths.sources_dir.join(&spec.list_file),
    }
}

fn prerequisite(spec: &RepositorySpec, message: impl std::fmt::Display) -> StrategyError {
    StrategyError::Prerequisite {
        what: format!("repository {}", spec.name),
        message: message.to_string(),
    }
}

fn source_line(spec: &RepositorySpec, layout: &Layout, ctx: &StrategyContext) -> StrategyResult<String> {
    let codename = if spec.source_line.contains("{codename}") {
        ctx.codename()
            .ok_or_else(|| prerequisite(spec, "cannot determine release codename"))?
    } else {
        String::new()
    };
    Ok(spec.render_line(
        &ctx.dpkg_arch(),
        &codename,
        &layout.keyring.to_string_lossy(),
    ))
}

fn is_registered(layout: &Layout, line: &str) -> bool {
    layout.keyring.is_file()
        && fs::read_to_string(&layout.list)
            .is_ok_and(|text| text.lines().any(|l| l.trim() == line))
}

/// Register the repository unless it already is. Returns whether anything was written.
pub fn register(spec: &RepositorySpec, ctx: &StrategyContext) -> StrategyResult<bool> {
    let layout = layout(spec, ctx);
    let line = source_line(spec, &layout, ctx)?;
    if is_registered(&layout, &line) {
        log::debug!("repository {} already registered", spec.name);
        return Ok(false);
    }

    if !layout.keyring.is_file() {
        let key = ctx
            .releases
            .fetch(&spec.keyring_url)
            .map_err(|e| prerequisite(spec, e))?;
        let key = if key.starts_with(ARMOR_HEADER) {
            let output = ctx
                .system
                .run_checked(&CommandSpec::new("gpg").arg("--dearmor").stdin(key))
                .map_err(|e| prerequisite(spec, e))?;
            output.stdout
        } else {
            key
        };
        write_file(&layout.keyring, &key, 0o644).map_err(|e| prerequisite(spec, e))?;
    }

    write_file(&layout.list, format!("{line}\n").as_bytes(), 0o644)
        .map_err(|e| prerequisite(spec, e))?;
    log::info!("registered repository {} in {}", spec.name, layout.list.display());
    Ok(true)
}

impl Installer for VendorRepository {
    fn tag(&self) -> StrategyTag {
        StrategyTag::VendorRepository
    }

    fn prepare(&self, entry: &CatalogEntry, ctx: &StrategyContext) -> StrategyResult<()> {
        register(repository(entry)?, ctx).map(|_| ())
    }

    fn install(
        &self,
        entry: &CatalogEntry,
        _pins: &VersionPins,
        ctx: &StrategyContext,
    ) -> StrategyResult<InstallReport> {
        let spec = repository(entry)?;
        if register(spec, ctx)? {
            ctx.packages
                .refresh_index()
                .map_err(|e| prerequisite(spec, e))?;
        }
        install_packages(&entry.packages, ctx)
    }

    fn remove(
        &self,
        entry: &CatalogEntry,
        snapshot: &ArtifactSnapshot,
        ctx: &StrategyContext,
    ) -> StrategyResult<()> {
        remove_packages(snapshot.packages(), ctx)?;
        if ctx.options.remove_repositories {
            let spec = repository(entry)?;
            let layout = layout(spec, ctx);
            remove_file(&layout.list)?;
            remove_file(&layout.keyring)?;
            log::info!("unregistered repository {}", spec.name);
        }
        Ok(())
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
        let mut finding = audit_packages(&entry.packages, ctx);
        if let Ok(spec) = repository(entry)
            && !layout(spec, ctx).list.is_file()
        {
            finding.details.push_str(&format!("; repository {} not registered", spec.name));
        }
        finding
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::context::ApplyOptions;
    use crate::host::CommandOutput;
    use crate::strategy::testing::Harness;
    use crate::types::CatalogKey;

    const GH_KEY_URL: &str = "https://cli.github.com/packages/githubcli-archive-keyring.gpg";

    fn gh() -> CatalogEntry {
        Catalog::builtin()
            .unwrap()
            .entry(&CatalogKey::new("gh"))
            .unwrap()
            .clone()
    }

    fn harness() -> Harness {
        let h = Harness::new();
        h.system.respond("dpkg --print-architecture", CommandOutput::ok("amd64\n"));
        h.releases.add_file(GH_KEY_URL, b"\x99binary-key".to_vec());
        h
    }

    #[test]
    fn test_register_writes_keyring_and_list() {
        let h = harness();
        let ctx = h.ctx();
        VendorRepository.prepare(&gh(), &ctx).unwrap();

        let keyring = h.root().join("keyrings/githubcli-archive-keyring.gpg");
        assert_eq!(fs::read(&keyring).unwrap(), b"\x99binary-key");
        let list = fs::read_to_string(h.root().join("sources/github-cli.list")).unwrap();
        assert_eq!(
            list.trim(),
            format!(
                "deb [arch=amd64 signed-by={}] https://cli.github.com/packages stable main",
                keyring.display()
            )
        );
    }

    #[test]
    fn test_register_is_idempotent() {
        let h = harness();
        let ctx = h.ctx();
        let spec = repository(&gh()).unwrap().clone();

        assert!(register(&spec, &ctx).unwrap());
        assert!(!register(&spec, &ctx).unwrap());
        assert_eq!(h.releases.requests(), vec![GH_KEY_URL.to_string()]);
    }

    #[test]
    fn test_armored_key_is_dearmored() {
        let h = Harness::new();
        h.releases.add_file(
            GH_KEY_URL,
            b"-----BEGIN PGP PUBLIC KEY BLOCK-----\n...".to_vec(),
        );
        h.system.respond("gpg --dearmor", CommandOutput::ok(b"\x99dearmored".to_vec()));
        VendorRepository.prepare(&gh(), &h.ctx()).unwrap();

        let keyring = h.root().join("keyrings/githubcli-archive-keyring.gpg");
        assert_eq!(fs::read(keyring).unwrap(), b"\x99dearmored");
        assert!(h.system.ran("gpg --dearmor"));
    }

    #[test]
    fn test_key_download_failure_is_prerequisite() {
        let h = Harness::new();
        let err = VendorRepository.prepare(&gh(), &h.ctx()).unwrap_err();
        assert!(matches!(err, StrategyError::Prerequisite { .. }));
        assert!(!h.root().join("sources/github-cli.list").exists());
    }

    #[test]
    fn test_install_registers_refreshes_and_installs() {
        let h = harness();
        h.apt.add_available("gh");
        let report = VendorRepository
            .install(&gh(), &VersionPins::defaults(), &h.ctx())
            .unwrap();
        assert!(matches!(report, InstallReport::Installed { .. }));
        assert_eq!(h.apt.installed(), vec!["gh".to_string()]);
    }

    #[test]
    fn test_remove_keeps_repository_by_default() {
        let h = harness();
        h.apt.add_installed("gh");
        let ctx = h.ctx();
        VendorRepository.prepare(&gh(), &ctx).unwrap();

        let snapshot = ArtifactSnapshot::Packages {
            packages: vec!["gh".into()],
        };
        VendorRepository.remove(&gh(), &snapshot, &ctx).unwrap();
        assert!(h.apt.installed().is_empty());
        assert!(h.root().join("sources/github-cli.list").exists());

        let opted_in = h.ctx_with(ApplyOptions {
            remove_repositories: true,
            ..ApplyOptions::default()
        });
        VendorRepository.remove(&gh(), &snapshot, &opted_in).unwrap();
        assert!(!h.root().join("sources/github-cli.list").exists());
        assert!(!h.root().join("keyrings/githubcli-archive-keyring.gpg").exists());
    }
}
