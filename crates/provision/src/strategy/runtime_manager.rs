//! Per-user language version managers (nvm, pyenv)
//!
//! Everything after the build dependencies runs as the target user, never
//! as root. Shell initialisation is written between marker comments in
//! `~/.bashrc` so removal can strip exactly what was added. A manager
//! directory that predates the first install belongs to the user and is
//! never claimed.

use std::fs;
use std::path::{Path, PathBuf};

use crate::catalog::{CatalogEntry, RuntimeManagerKind, RuntimeManagerSpec, StrategyParams};
use crate::context::{StrategyContext, TargetUser};
use crate::error::{Severity, StrategyError, StrategyResult};
use crate::host::CommandSpec;
use crate::ledger::ArtifactSnapshot;
use crate::pins::{LATEST, VersionPins};
use crate::types::StrategyTag;

use super::native::install_packages;
use super::{AuditFinding, InstallReport, Installer, entry_pin};

pub struct RuntimeManager;

fn spec(entry: &CatalogEntry) -> StrategyResult<&RuntimeManagerSpec> {
    match &entry.params {
        StrategyParams::RuntimeManager(spec) => Ok(spec),
        _ => Err(StrategyError::MissingParams(entry.key.clone())),
    }
}

fn manager_dir(kind: RuntimeManagerKind, user: &TargetUser) -> PathBuf {
    user.home.join(kind.dir_name())
}

fn begin_marker(kind: RuntimeManagerKind) -> String {
    format!("# >>> hostkit {} >>>", kind.name())
}

fn end_marker(kind: RuntimeManagerKind) -> String {
    format!("# <<< hostkit {} <<<", kind.name())
}

/// Drop the marked block for `kind`, leaving every other line untouched.
pub fn strip_profile_block(text: &str, kind: RuntimeManagerKind) -> String {
    let begin = begin_marker(kind);
    let end = end_marker(kind);
    let mut out = String::with_capacity(text.len());
    let mut inside = false;
    for line in text.lines() {
        if line.trim() == begin {
            inside = true;
        } else if inside && line.trim() == end {
            inside = false;
        } else if !inside {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

fn render_block(spec: &RuntimeManagerSpec) -> String {
    let mut block = begin_marker(spec.kind);
    block.push('\n');
    for line in &spec.profile_lines {
        block.push_str(line);
        block.push('\n');
    }
    block.push_str(&end_marker(spec.kind));
    block.push('\n');
    block
}

fn user_command(program: &str, user: &TargetUser, kind: RuntimeManagerKind, dir: &Path) -> CommandSpec {
    CommandSpec::new(program)
        .as_user(&user.name)
        .env(kind.root_var(), dir.to_string_lossy())
}

fn run_as_user(cmd: &CommandSpec, user: &TargetUser, ctx: &StrategyContext) -> StrategyResult<String> {
    ctx.system
        .run_checked(cmd)
        .map(|output| output.stdout_str())
        .map_err(|e| StrategyError::UserInstall {
            user: user.name.clone(),
            message: e.to_string(),
        })
}

/// Install and select the pinned runtime; returns the version now active.
fn install_runtime(
    kind: RuntimeManagerKind,
    pin: &str,
    user: &TargetUser,
    dir: &Path,
    ctx: &StrategyContext,
) -> StrategyResult<String> {
    match kind {
        RuntimeManagerKind::Nvm => {
            let target = if pin == LATEST { "node" } else { pin };
            let script = format!(
                ". \"$NVM_DIR/nvm.sh\" && nvm install {target} && nvm alias default {target} && nvm version default"
            );
            let cmd = user_command("bash", user, kind, dir).args(["-c", script.as_str()]);
            let stdout = run_as_user(&cmd, user, ctx)?;
            Ok(stdout
                .lines()
                .rev()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map_or_else(|| target.to_string(), |v| v.trim_start_matches('v').to_string()))
        }
        RuntimeManagerKind::Pyenv => {
            let pyenv = dir.join("bin/pyenv").to_string_lossy().to_string();
            let target = if pin == LATEST {
                let cmd = user_command(&pyenv, user, kind, dir).args(["latest", "-k", "3"]);
                let latest = run_as_user(&cmd, user, ctx)?.trim().to_string();
                if latest.is_empty() {
                    return Err(StrategyError::UserInstall {
                        user: user.name.clone(),
                        message: "pyenv latest -k 3 returned nothing".to_string(),
                    });
                }
                latest
            } else {
                pin.to_string()
            };
            run_as_user(
                &user_command(&pyenv, user, kind, dir).args(["install", "-s", target.as_str()]),
                user,
                ctx,
            )?;
            run_as_user(
                &user_command(&pyenv, user, kind, dir).args(["global", target.as_str()]),
                user,
                ctx,
            )?;
            Ok(target)
        }
    }
}

/// Ensure `~/.bashrc` carries the current block. Returns the file path.
fn ensure_profile_block(spec: &RuntimeManagerSpec, user: &TargetUser, ctx: &StrategyContext) -> StrategyResult<PathBuf> {
    let path = user.home.join(".bashrc");
    let created = !path.exists();
    let existing = if created {
        String::new()
    } else {
        fs::read_to_string(&path).map_err(|e| StrategyError::io(&path, e))?
    };

    let mut updated = strip_profile_block(&existing, spec.kind);
    if !updated.is_empty() && !updated.ends_with("\n\n") {
        updated.push('\n');
    }
    updated.push_str(&render_block(spec));

    if updated != existing {
        fs::write(&path, &updated).map_err(|e| StrategyError::io(&path, e))?;
        if created {
            let chown = CommandSpec::new("chown")
                .arg(format!("{}:", user.name))
                .arg(path.to_string_lossy());
            if let Err(e) = ctx.system.run_checked(&chown) {
                log::warn!("could not hand {} to {}: {e}", path.display(), user.name);
            }
        }
    }
    Ok(path)
}

/// Build dependencies, the manager itself when `fetch_manager` is set, the
/// pinned runtime and the profile block.
fn provision(
    entry: &CatalogEntry,
    spec: &RuntimeManagerSpec,
    user: &TargetUser,
    pins: &VersionPins,
    ctx: &StrategyContext,
    fetch_manager: bool,
) -> StrategyResult<InstallReport> {
    let mut warnings = Vec::new();
    if !spec.build_packages.is_empty() {
        match install_packages(&spec.build_packages, ctx) {
            Ok(InstallReport::Installed { warnings: w, .. }) => warnings.extend(w),
            Ok(_) => {}
            Err(e) if e.severity() == Severity::Skippable => {
                log::warn!("build dependencies for {}: {e}", spec.kind.name());
                warnings.push(e.to_string());
            }
            Err(e) => return Err(e),
        }
    }

    let dir = manager_dir(spec.kind, user);
    if fetch_manager {
        let script = ctx.releases.fetch(&spec.install_url)?;
        let cmd = user_command("bash", user, spec.kind, &dir)
            .arg("-s")
            .env("PROFILE", "/dev/null")
            .stdin(script);
        run_as_user(&cmd, user, ctx)?;
    }

    let version = install_runtime(spec.kind, entry_pin(entry, pins), user, &dir, ctx)?;
    let profile = ensure_profile_block(spec, user, ctx)?;
    log::info!("{} ready for {} with {version}", spec.kind.name(), user.name);

    Ok(InstallReport::Installed {
        snapshot: ArtifactSnapshot::RuntimeManager {
            user: user.name.clone(),
            manager_dir: dir,
            runtime_version: version,
            profile_files: vec![profile],
        },
        warnings,
    })
}

impl Installer for RuntimeManager {
    fn tag(&self) -> StrategyTag {
        StrategyTag::PerUserRuntimeManager
    }

    fn install(
        &self,
        entry: &CatalogEntry,
        pins: &VersionPins,
        ctx: &StrategyContext,
    ) -> StrategyResult<InstallReport> {
        let spec = spec(entry)?;
        let user = ctx.require_user()?;
        let dir = manager_dir(spec.kind, user);
        if dir.is_dir() {
            return Ok(InstallReport::AlreadyPresent {
                detail: format!("{} already at {}", spec.kind.name(), dir.display()),
            });
        }
        provision(entry, spec, user, pins, ctx, true)
    }

    fn reinstall(
        &self,
        entry: &CatalogEntry,
        snapshot: &ArtifactSnapshot,
        pins: &VersionPins,
        ctx: &StrategyContext,
    ) -> StrategyResult<InstallReport> {
        let spec = spec(entry)?;
        let user = ctx.require_user()?;
        match snapshot {
            ArtifactSnapshot::RuntimeManager { manager_dir: owned, .. }
                if *owned == manager_dir(spec.kind, user) && owned.is_dir() =>
            {
                provision(entry, spec, user, pins, ctx, false)
            }
            _ => self.install(entry, pins, ctx),
        }
    }

    fn remove(
        &self,
        entry: &CatalogEntry,
        snapshot: &ArtifactSnapshot,
        _ctx: &StrategyContext,
    ) -> StrategyResult<()> {
        let spec = spec(entry)?;
        let ArtifactSnapshot::RuntimeManager {
            manager_dir,
            profile_files,
            ..
        } = snapshot
        else {
            return Err(StrategyError::MissingParams(entry.key.clone()));
        };
        if manager_dir.file_name().and_then(|n| n.to_str()) != Some(spec.kind.dir_name()) {
            return Err(StrategyError::command(
                format!("remove {}", manager_dir.display()),
                format!("not a {} directory", spec.kind.name()),
            ));
        }

        match fs::remove_dir_all(manager_dir) {
            Ok(()) => log::info!("removed {}", manager_dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StrategyError::io(manager_dir, e)),
        }

        for profile in profile_files {
            let text = match fs::read_to_string(profile) {
                Ok(text) => text,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StrategyError::io(profile, e)),
            };
            let stripped = strip_profile_block(&text, spec.kind);
            if stripped != text {
                fs::write(profile, stripped).map_err(|e| StrategyError::io(profile, e))?;
            }
        }
        Ok(())
    }

    fn verify(
        &self,
        entry: &CatalogEntry,
        snapshot: &ArtifactSnapshot,
        pins: &VersionPins,
        _ctx: &StrategyContext,
    ) -> StrategyResult<bool> {
        let ArtifactSnapshot::RuntimeManager {
            manager_dir,
            runtime_version,
            ..
        } = snapshot
        else {
            return Ok(false);
        };
        let pin = entry_pin(entry, pins).trim_start_matches('v');
        let pinned = pin == LATEST
            || runtime_version == pin
            || runtime_version.starts_with(&format!("{pin}."));
        Ok(manager_dir.is_dir() && pinned)
    }

    fn audit(&self, entry: &CatalogEntry, _pins: &VersionPins, ctx: &StrategyContext) -> AuditFinding {
        let spec = match spec(entry) {
            Ok(spec) => spec,
            Err(e) => return AuditFinding::unknown(e.to_string()),
        };
        let Some(user) = ctx.user.as_ref() else {
            return AuditFinding::unknown("no target user to check");
        };
        let dir = manager_dir(spec.kind, user);
        if dir.is_dir() {
            AuditFinding::ok(format!("{} at {}", spec.kind.name(), dir.display()))
        } else {
            AuditFinding::missing(format!("{} not found", dir.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::host::CommandOutput;
    use crate::pins::Pin;
    use crate::strategy::AuditStatus;
    use crate::strategy::testing::Harness;
    use crate::types::CatalogKey;

    const NVM_URL: &str = "https://raw.githubusercontent.com/nvm-sh/nvm/v0.40.1/install.sh";

    fn entry(key: &str) -> CatalogEntry {
        Catalog::builtin()
            .unwrap()
            .entry(&CatalogKey::new(key))
            .unwrap()
            .clone()
    }

    fn nvm_harness() -> Harness {
        let h = Harness::new();
        h.releases.add_file(NVM_URL, b"# nvm installer".to_vec());
        h.system.on_run_create_dir("bash -s", h.home().join(".nvm"));
        h.system
            .respond("nvm version default", CommandOutput::ok("Now using node v22.11.0\nv22.11.0\n"));
        h
    }

    #[test]
    fn test_nvm_install_as_user() {
        let h = nvm_harness();
        let report = RuntimeManager
            .install(&entry("node"), &VersionPins::defaults(), &h.ctx())
            .unwrap();

        let InstallReport::Installed { snapshot, .. } = report else {
            panic!("expected an install");
        };
        assert_eq!(
            snapshot,
            ArtifactSnapshot::RuntimeManager {
                user: "alice".into(),
                manager_dir: h.home().join(".nvm"),
                runtime_version: "22.11.0".into(),
                profile_files: vec![h.home().join(".bashrc")],
            }
        );

        let specs = h.system.specs();
        let installer = specs.iter().find(|c| c.args == ["-s"]).unwrap();
        assert_eq!(installer.as_user.as_deref(), Some("alice"));
        assert_eq!(installer.stdin.as_deref(), Some(b"# nvm installer".as_slice()));
        assert!(installer.env.contains(&("PROFILE".into(), "/dev/null".into())));
        assert!(h.system.ran("nvm install node && nvm alias default node"));
    }

    #[test]
    fn test_reinstall_reuses_owned_manager() {
        let h = nvm_harness();
        let ctx = h.ctx();
        let pins = VersionPins::defaults();
        let InstallReport::Installed { snapshot, .. } =
            RuntimeManager.install(&entry("node"), &pins, &ctx).unwrap()
        else {
            panic!("expected an install");
        };
        assert!(matches!(
            RuntimeManager.install(&entry("node"), &pins, &ctx).unwrap(),
            InstallReport::AlreadyPresent { .. }
        ));

        let report = RuntimeManager
            .reinstall(&entry("node"), &snapshot, &pins, &ctx)
            .unwrap();
        assert!(matches!(report, InstallReport::Installed { .. }));

        let installs = h.system.commands().iter().filter(|c| c.ends_with("bash -s")).count();
        assert_eq!(installs, 1);
        assert_eq!(h.releases.requests().len(), 1);
        assert_eq!(h.system.commands().iter().filter(|c| c.contains("nvm install")).count(), 2);

        let bashrc = fs::read_to_string(h.home().join(".bashrc")).unwrap();
        assert_eq!(bashrc.matches("# >>> hostkit nvm >>>").count(), 1);
    }

    #[test]
    fn test_preexisting_manager_is_not_claimed() {
        let h = nvm_harness();
        let ctx = h.ctx();
        let pins = VersionPins::defaults();
        fs::create_dir_all(h.home().join(".nvm/versions")).unwrap();
        assert!(!RuntimeManager.would_install(&entry("node"), &pins, &ctx).unwrap());

        let report = RuntimeManager.install(&entry("node"), &pins, &ctx).unwrap();
        assert!(matches!(report, InstallReport::AlreadyPresent { .. }));
        assert!(h.system.commands().is_empty());
        assert!(h.releases.requests().is_empty());
        assert!(!h.home().join(".bashrc").exists());
        assert!(h.home().join(".nvm/versions").is_dir());
    }

    #[test]
    fn test_profile_block_strip_preserves_other_lines() {
        let text = "alias ll='ls -l'\n# >>> hostkit nvm >>>\nexport NVM_DIR=x\n# <<< hostkit nvm <<<\nexport EDITOR=vim\n";
        assert_eq!(
            strip_profile_block(text, RuntimeManagerKind::Nvm),
            "alias ll='ls -l'\nexport EDITOR=vim\n"
        );
        assert_eq!(strip_profile_block(text, RuntimeManagerKind::Pyenv), text);
    }

    #[test]
    fn test_remove_deletes_dir_and_block() {
        let h = nvm_harness();
        let ctx = h.ctx();
        fs::write(h.home().join(".bashrc"), "export EDITOR=vim\n").unwrap();
        let InstallReport::Installed { snapshot, .. } = RuntimeManager
            .install(&entry("node"), &VersionPins::defaults(), &ctx)
            .unwrap()
        else {
            panic!("expected an install");
        };

        RuntimeManager.remove(&entry("node"), &snapshot, &ctx).unwrap();
        assert!(!h.home().join(".nvm").exists());
        let bashrc = fs::read_to_string(h.home().join(".bashrc")).unwrap();
        assert!(!bashrc.contains("hostkit nvm"));
        assert!(bashrc.contains("export EDITOR=vim"));
    }

    #[test]
    fn test_pyenv_latest_and_build_deps() {
        let h = Harness::new();
        for pkg in ["build-essential", "libssl-dev", "zlib1g-dev"] {
            h.apt.add_available(pkg);
        }
        h.releases.add_file("https://pyenv.run", b"# pyenv installer".to_vec());
        h.system.on_run_create_dir("bash -s", h.home().join(".pyenv"));
        h.system.respond("pyenv latest -k 3", CommandOutput::ok("3.13.1\n"));

        let report = RuntimeManager
            .install(&entry("pyenv"), &VersionPins::defaults(), &h.ctx())
            .unwrap();
        let InstallReport::Installed { snapshot, warnings } = report else {
            panic!("expected an install");
        };
        assert!(h.apt.installed().contains(&"libssl-dev".to_string()));
        assert!(!warnings.is_empty());
        assert!(h.system.ran("pyenv install -s 3.13.1"));
        assert!(h.system.ran("pyenv global 3.13.1"));
        let ArtifactSnapshot::RuntimeManager { runtime_version, .. } = snapshot else {
            panic!("expected a runtime manager snapshot");
        };
        assert_eq!(runtime_version, "3.13.1");
    }

    #[test]
    fn test_user_install_failure() {
        let h = nvm_harness();
        h.system.respond("nvm install", CommandOutput::failed("N/A: version not found"));
        let err = RuntimeManager
            .install(&entry("node"), &VersionPins::defaults(), &h.ctx())
            .unwrap_err();
        assert!(matches!(err, StrategyError::UserInstall { .. }));
    }

    #[test]
    fn test_requires_target_user() {
        let h = nvm_harness();
        let mut ctx = h.ctx();
        ctx.user = None;
        let err = RuntimeManager
            .install(&entry("node"), &VersionPins::defaults(), &ctx)
            .unwrap_err();
        assert!(matches!(err, StrategyError::NoTargetUser));
        assert_eq!(
            RuntimeManager.audit(&entry("node"), &VersionPins::defaults(), &ctx).status,
            AuditStatus::Unknown
        );
    }

    #[test]
    fn test_verify_follows_pin() {
        let h = Harness::new();
        fs::create_dir_all(h.home().join(".nvm")).unwrap();
        let snapshot = ArtifactSnapshot::RuntimeManager {
            user: "alice".into(),
            manager_dir: h.home().join(".nvm"),
            runtime_version: "20.18.0".into(),
            profile_files: vec![],
        };
        let ctx = h.ctx();
        let mut pins = VersionPins::defaults();
        assert!(RuntimeManager.verify(&entry("node"), &snapshot, &pins, &ctx).unwrap());
        pins.set(Pin::NodeVersion, "20").unwrap();
        assert!(RuntimeManager.verify(&entry("node"), &snapshot, &pins, &ctx).unwrap());
        pins.set(Pin::NodeVersion, "22").unwrap();
        assert!(!RuntimeManager.verify(&entry("node"), &snapshot, &pins, &ctx).unwrap());
    }
}
