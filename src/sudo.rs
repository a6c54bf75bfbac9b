//! Scoped privilege escalation
//!
//! Only `apply` needs root. When run unprivileged, hostkit:
//! 1. Resolves config, state dir and target user as the invoking account
//! 2. Validates sudo once, showing why it is needed
//! 3. Re-runs itself under sudo with those values pinned
//! 4. Drops the sudo timestamp when done

use anyhow::{Context, Result, bail};
use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, ExitStatus};

use crate::paths::{ENV_CONFIG_DIR, ENV_STATE_DIR};

/// Whether the effective uid is 0.
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

/// Whether a `sudo` binary is on PATH.
pub fn sudo_available() -> bool {
    Command::new("sudo")
        .arg("-V")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Scoped sudo context - invalidates the timestamp on drop
pub struct SudoContext {
    validated: bool,
}

impl SudoContext {
    /// Acquire sudo privileges with a reason shown to user
    pub fn acquire(reason: &str) -> Result<Self> {
        eprintln!();
        eprintln!("  Sudo required: {reason}");
        eprintln!();

        let status = Command::new("sudo")
            .arg("-v")
            .status()
            .context("Failed to execute sudo")?;

        if !status.success() {
            bail!("Failed to acquire sudo privileges");
        }

        Ok(Self { validated: true })
    }

    /// Check if sudo is currently valid (without prompting)
    pub fn is_valid() -> bool {
        Command::new("sudo")
            .args(["-n", "true"])
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Re-run the current executable as root with `args`.
    ///
    /// Directories are passed explicitly because sudo resets `HOME`.
    pub fn reexec(
        &self,
        config_dir: &Path,
        state_dir: &Path,
        args: &[OsString],
    ) -> Result<ExitStatus> {
        if !self.validated {
            bail!("Sudo context not validated");
        }
        let exe = std::env::current_exe().context("Failed to locate the hostkit executable")?;
        let mut cmd = Command::new("sudo");
        if std::env::var_os("GITHUB_TOKEN").is_some() {
            cmd.arg("--preserve-env=GITHUB_TOKEN");
        }
        cmd.arg("env")
            .arg(format!("{ENV_CONFIG_DIR}={}", config_dir.display()))
            .arg(format!("{ENV_STATE_DIR}={}", state_dir.display()))
            .arg(exe)
            .args(args);
        log::debug!("Re-running under sudo: {cmd:?}");
        cmd.status().context("Failed to execute sudo")
    }
}

impl Drop for SudoContext {
    fn drop(&mut self) {
        let _ = Command::new("sudo").arg("-k").status();
    }
}
