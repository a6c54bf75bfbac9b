//! Real apt backend using `apt-get`, `apt-cache` and `dpkg-query`.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::retry::{LogCallback, with_retry};
use crate::types::{InstalledPackage, RetryConfig};
use std::path::PathBuf;
use std::process::{Command, Output};

/// Seconds apt waits for the dpkg frontend lock before giving up.
const LOCK_TIMEOUT_SECS: u32 = 120;

/// Backend that executes real apt commands.
///
/// Mutating commands need root; the caller is expected to have elevated
/// the whole process before any transaction runs.
pub struct AptBackend {
    /// Path to the apt-get executable
    apt_get: PathBuf,
    /// Retry policy for mutating commands
    retry: RetryConfig,
}

impl AptBackend {
    /// Create a new AptBackend.
    ///
    /// Returns an error if apt-get is not installed.
    pub fn new() -> Result<Self> {
        let apt_get = which::which("apt-get").map_err(|_| Error::AptNotFound)?;
        Ok(Self::at(apt_get))
    }

    fn at(apt_get: PathBuf) -> Self {
        Self {
            apt_get,
            retry: RetryConfig::default(),
        }
    }

    /// apt-get with the lock timeout and non-interactive frontend.
    fn apt_get_command(&self, args: &[&str]) -> Command {
        let lock_opt = format!("DPkg::Lock::Timeout={LOCK_TIMEOUT_SECS}");
        let mut cmd = Command::new(&self.apt_get);
        cmd.env("DEBIAN_FRONTEND", "noninteractive")
            .args(["-o", &lock_opt])
            .args(args);
        cmd
    }

    fn run_apt_get(&self, args: &[&str]) -> Result<Output> {
        log::debug!("apt-get {}", args.join(" "));
        self.apt_get_command(args)
            .output()
            .map_err(|e| Error::CommandFailed {
                message: format!("failed to execute apt-get: {e}"),
                stderr: String::new(),
            })
    }

    /// Run apt-get, retrying transient failures, and map a non-zero exit to an error.
    fn run_apt_get_checked(&self, args: &[&str]) -> Result<()> {
        let context = format!("apt-get {}", args.first().copied().unwrap_or_default());
        with_retry(&self.retry, Some(&LogCallback), || {
            let output = self.run_apt_get(args)?;
            if output.status.success() {
                Ok(())
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(Error::from_apt_output(&stderr, &context))
            }
        })
    }

    fn run_readonly(program: &str, args: &[&str]) -> Result<Output> {
        Command::new(program)
            .args(args)
            .output()
            .map_err(|e| Error::CommandFailed {
                message: format!("failed to execute {program}: {e}"),
                stderr: String::new(),
            })
    }
}

impl Backend for AptBackend {
    fn is_available(&self) -> bool {
        self.apt_get.exists() && which::which("dpkg-query").is_ok()
    }

    fn refresh_index(&self) -> Result<()> {
        self.run_apt_get_checked(&["update"])
    }

    fn has_candidate(&self, name: &str) -> Result<bool> {
        let output = Self::run_readonly("apt-cache", &["policy", name])?;
        if !output.status.success() {
            return Ok(false);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_candidate(&stdout).is_some())
    }

    fn query(&self, name: &str) -> Result<Option<InstalledPackage>> {
        let output = Self::run_readonly(
            "dpkg-query",
            &["-W", "-f=${Status}\t${Version}", name],
        )?;
        // dpkg-query exits 1 for unknown packages
        if !output.status.success() {
            return Ok(None);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_dpkg_status(name, &stdout))
    }

    fn install(&self, packages: &[String]) -> Result<()> {
        if packages.is_empty() {
            return Ok(());
        }
        let mut args = vec!["install", "-y"];
        args.extend(packages.iter().map(String::as_str));
        self.run_apt_get_checked(&args)
    }

    fn remove(&self, packages: &[String]) -> Result<()> {
        if packages.is_empty() {
            return Ok(());
        }
        let mut args = vec!["remove", "-y"];
        args.extend(packages.iter().map(String::as_str));
        self.run_apt_get_checked(&args)
    }

    fn autoremove(&self) -> Result<()> {
        self.run_apt_get_checked(&["autoremove", "-y"])
    }
}

/// Parse the candidate version out of `apt-cache policy` output.
///
/// Returns `None` when the package is unknown or the candidate is `(none)`.
pub fn parse_candidate(policy_output: &str) -> Option<String> {
    policy_output
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("Candidate:"))
        .map(str::trim)
        .filter(|candidate| !candidate.is_empty() && *candidate != "(none)")
        .map(str::to_string)
}

/// Parse `dpkg-query -W -f='${Status}\t${Version}'` output.
///
/// Only the `install ok installed` status counts as installed; removed
/// packages with leftover config files report `deinstall ok config-files`.
pub fn parse_dpkg_status(name: &str, output: &str) -> Option<InstalledPackage> {
    let (status, version) = output.trim().split_once('\t')?;
    if status.trim() != "install ok installed" {
        return None;
    }
    Some(InstalledPackage {
        name: name.to_string(),
        version: version.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    #[test]
    fn test_apt_get_command_is_non_interactive() {
        let apt = AptBackend::at(PathBuf::from("/usr/bin/apt-get"));
        let cmd = apt.apt_get_command(&["install", "-y", "jq"]);
        assert_eq!(cmd.get_program(), OsStr::new("/usr/bin/apt-get"));
        let args: Vec<&OsStr> = cmd.get_args().collect();
        assert_eq!(
            args,
            ["-o", "DPkg::Lock::Timeout=120", "install", "-y", "jq"].map(OsStr::new)
        );
        assert!(
            cmd.get_envs()
                .any(|(k, v)| k == "DEBIAN_FRONTEND" && v == Some(OsStr::new("noninteractive")))
        );
    }

    #[test]
    fn test_parse_candidate_present() {
        let output = "curl:\n  Installed: (none)\n  Candidate: 8.5.0-2ubuntu10.4\n  Version table:\n";
        assert_eq!(parse_candidate(output), Some("8.5.0-2ubuntu10.4".to_string()));
    }

    #[test]
    fn test_parse_candidate_none() {
        let output = "python2:\n  Installed: (none)\n  Candidate: (none)\n  Version table:\n";
        assert_eq!(parse_candidate(output), None);
    }

    #[test]
    fn test_parse_candidate_unknown_package() {
        // apt-cache policy prints nothing for names it has never heard of
        assert_eq!(parse_candidate(""), None);
    }

    #[test]
    fn test_parse_dpkg_status_installed() {
        let pkg = parse_dpkg_status("jq", "install ok installed\t1.7.1-3build1").unwrap();
        assert_eq!(pkg.name, "jq");
        assert_eq!(pkg.version, "1.7.1-3build1");
    }

    #[test]
    fn test_parse_dpkg_status_config_files_only() {
        assert!(parse_dpkg_status("jq", "deinstall ok config-files\t1.7.1-3build1").is_none());
    }

    #[test]
    fn test_parse_dpkg_status_garbage() {
        assert!(parse_dpkg_status("jq", "").is_none());
    }
}
