//! Vendor install scripts (get.docker.com, tailscale.com/install.sh)
//!
//! The script is downloaded into a private temporary directory and run with
//! `sh`. Removal goes through a generated script kept under the state
//! directory, so an operator can read exactly what will run.

use std::fmt::Write as _;
use std::path::PathBuf;

use crate::catalog::{CatalogEntry, ScriptSpec, StrategyParams};
use crate::context::StrategyContext;
use crate::error::{StrategyError, StrategyResult};
use crate::host::CommandSpec;
use crate::ledger::ArtifactSnapshot;
use crate::pins::VersionPins;
use crate::types::{CatalogKey, StrategyTag};

use super::{AuditFinding, InstallReport, Installer, write_file};

/// Environment switch that lets a removal script delete data directories.
pub const PURGE_ENV: &str = "HOSTKIT_PURGE_DATA";

pub struct ScriptedInstaller;

fn spec(entry: &CatalogEntry) -> StrategyResult<&ScriptSpec> {
    match &entry.params {
        StrategyParams::Script(spec) => Ok(spec),
        _ => Err(StrategyError::MissingParams(entry.key.clone())),
    }
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Render the removal script for an entry.
pub fn render_removal_script(key: &CatalogKey, spec: &ScriptSpec, sha256: &str) -> String {
    let recipe = &spec.removal;
    let mut out = String::new();
    let _ = writeln!(out, "#!/bin/sh");
    let _ = writeln!(out, "# hostkit removal script for {key}");
    let _ = writeln!(out, "# installer: {} (sha256 {sha256})", spec.script_url);
    let _ = writeln!(out, "# Set {PURGE_ENV}=1 to also delete data directories.");
    let _ = writeln!(out, "set -u");
    out.push('\n');

    for service in &recipe.stop_services {
        let _ = writeln!(out, "systemctl disable --now {} 2>/dev/null || true", quote(service));
    }
    if !recipe.packages.is_empty() {
        let names: Vec<String> = recipe.packages.iter().map(|p| quote(p)).collect();
        let _ = writeln!(out, "for pkg in {}; do", names.join(" "));
        let _ = writeln!(
            out,
            "  DEBIAN_FRONTEND=noninteractive apt-get purge -y \"$pkg\" || true"
        );
        let _ = writeln!(out, "done");
    }
    for file in &recipe.files {
        let _ = writeln!(out, "rm -f {}", quote(file));
    }
    if !recipe.data_dirs.is_empty() {
        let _ = writeln!(out, "if [ \"${{{PURGE_ENV}:-0}}\" = \"1\" ]; then");
        for dir in &recipe.data_dirs {
            let _ = writeln!(out, "  rm -rf {}", quote(dir));
        }
        let _ = writeln!(out, "fi");
    }
    let _ = writeln!(out, "exit 0");
    out
}

fn removal_path(key: &CatalogKey, ctx: &StrategyContext) -> PathBuf {
    ctx.state.removal_dir().join(format!("{key}-remove.sh"))
}

fn write_removal_script(
    key: &CatalogKey,
    spec: &ScriptSpec,
    sha256: &str,
    ctx: &StrategyContext,
) -> StrategyResult<PathBuf> {
    let path = removal_path(key, ctx);
    write_file(&path, render_removal_script(key, spec, sha256).as_bytes(), 0o700)?;
    Ok(path)
}

fn run_installer(script: &[u8], ctx: &StrategyContext) -> StrategyResult<()> {
    let dir = tempfile::Builder::new()
        .prefix("hostkit-script-")
        .tempdir()
        .map_err(|e| StrategyError::io(std::env::temp_dir(), e))?;
    let path = dir.path().join("install.sh");
    write_file(&path, script, 0o700)?;
    ctx.system
        .run_checked(&CommandSpec::new("sh").arg(path.to_string_lossy()))?;
    Ok(())
}

fn save_for_review(key: &CatalogKey, script: &[u8], sha256: &str, ctx: &StrategyContext) -> StrategyResult<PathBuf> {
    let short = sha256.get(..12).unwrap_or(sha256);
    let path = ctx.state.scripts_dir().join(format!("{key}-{short}.sh"));
    write_file(&path, script, 0o600)?;
    Ok(path)
}

impl Installer for ScriptedInstaller {
    fn tag(&self) -> StrategyTag {
        StrategyTag::ScriptedInstaller
    }

    fn install(
        &self,
        entry: &CatalogEntry,
        _pins: &VersionPins,
        ctx: &StrategyContext,
    ) -> StrategyResult<InstallReport> {
        let spec = spec(entry)?;
        if let Some(path) = ctx.system.which(&spec.detect_binary) {
            return Ok(InstallReport::AlreadyPresent {
                detail: format!("{} already at {}", spec.detect_binary, path.display()),
            });
        }

        let script = ctx.releases.fetch(&spec.script_url)?;
        let sha256 = toolchain::checksum::sha256_hex(&script);

        if ctx.options.script_audit_only {
            let saved = save_for_review(&entry.key, &script, &sha256, ctx)?;
            log::info!("saved {} for review at {}", spec.script_url, saved.display());
            return Ok(InstallReport::Deferred {
                reason: format!("audit-only: script saved to {} (sha256 {sha256})", saved.display()),
            });
        }

        log::info!("running {} (sha256 {sha256})", spec.script_url);
        run_installer(&script, ctx)?;

        let mut warnings = Vec::new();
        for service in &spec.services {
            let cmd = CommandSpec::new("systemctl").args(["enable", "--now", service.as_str()]);
            if let Err(e) = ctx.system.run_checked(&cmd) {
                log::warn!("could not start {service}: {e}");
                warnings.push(format!("service {service} not started: {e}"));
            }
        }

        let removal_script = write_removal_script(&entry.key, spec, &sha256, ctx)?;
        Ok(InstallReport::Installed {
            snapshot: ArtifactSnapshot::Script {
                script_url: spec.script_url.clone(),
                sha256,
                removal_script,
            },
            warnings,
        })
    }

    fn would_install(
        &self,
        entry: &CatalogEntry,
        _pins: &VersionPins,
        ctx: &StrategyContext,
    ) -> StrategyResult<bool> {
        Ok(ctx.system.which(&spec(entry)?.detect_binary).is_none())
    }

    fn remove(
        &self,
        entry: &CatalogEntry,
        snapshot: &ArtifactSnapshot,
        ctx: &StrategyContext,
    ) -> StrategyResult<()> {
        let ArtifactSnapshot::Script {
            sha256,
            removal_script,
            ..
        } = snapshot
        else {
            return Err(StrategyError::MissingParams(entry.key.clone()));
        };

        let script = if removal_script.is_file() {
            removal_script.clone()
        } else {
            log::warn!(
                "{} missing, regenerating from the catalog",
                removal_script.display()
            );
            write_removal_script(&entry.key, spec(entry)?, sha256, ctx)?
        };

        let mut cmd = CommandSpec::new("sh").arg(script.to_string_lossy());
        if ctx.options.purge_data {
            cmd = cmd.env(PURGE_ENV, "1");
        }
        ctx.system.run_checked(&cmd)?;
        Ok(())
    }

    fn verify(
        &self,
        entry: &CatalogEntry,
        _snapshot: &ArtifactSnapshot,
        _pins: &VersionPins,
        ctx: &StrategyContext,
    ) -> StrategyResult<bool> {
        Ok(ctx.system.which(&spec(entry)?.detect_binary).is_some())
    }

    fn audit(&self, entry: &CatalogEntry, _pins: &VersionPins, ctx: &StrategyContext) -> AuditFinding {
        let spec = match spec(entry) {
            Ok(spec) => spec,
            Err(e) => return AuditFinding::unknown(e.to_string()),
        };
        if ctx.system.which(&spec.detect_binary).is_none() {
            return AuditFinding::missing(format!("{} not on PATH", spec.detect_binary));
        }

        let mut unknown = Vec::new();
        for service in &spec.services {
            match ctx.system.service_active(service) {
                Some(true) => {}
                Some(false) => return AuditFinding::missing(format!("service {service} inactive")),
                None => unknown.push(service.as_str()),
            }
        }
        if unknown.is_empty() {
            AuditFinding::ok(format!("{} present, services active", spec.detect_binary))
        } else {
            AuditFinding::unknown(format!("cannot query {}", unknown.join(", ")))
        }
    }
}
