//! hostkit configuration (`config.toml`)
//!
//! Every key is optional. A missing file means defaults, and the defaults are
//! written out on first use so there is something to edit.
//!
//! ```toml
//! [paths]
//! state_dir = "~/.local/state/hostkit"
//! bin_dir = "/usr/local/bin"
//!
//! [apply]
//! autoremove = true
//! remove_repositories = false
//!
//! [backups]
//! retention = 10
//!
//! [user]
//! name = "alice"
//! ```

use anyhow::{Context, Result};
use provision::{ApplyOptions, HostPaths, TargetUser};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::paths;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostkitConfig {
    pub paths: PathsSection,
    pub apply: ApplySection,
    pub backups: BackupsSection,
    pub user: UserSection,
    pub network: NetworkSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    /// Overrides `HOSTKIT_STATE_DIR` and the XDG default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<String>,
    pub bin_dir: String,
    pub sources_dir: String,
    pub keyrings_dir: String,
}

impl Default for PathsSection {
    fn default() -> Self {
        let host = HostPaths::default();
        Self {
            state_dir: None,
            bin_dir: host.bin_dir.display().to_string(),
            sources_dir: host.sources_dir.display().to_string(),
            keyrings_dir: host.keyrings_dir.display().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplySection {
    pub autoremove: bool,
    pub remove_repositories: bool,
    pub purge_data: bool,
    pub script_audit_only: bool,
}

impl Default for ApplySection {
    fn default() -> Self {
        let options = ApplyOptions::default();
        Self {
            autoremove: options.autoremove,
            remove_repositories: options.remove_repositories,
            purge_data: options.purge_data,
            script_audit_only: options.script_audit_only,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupsSection {
    pub retention: usize,
}

impl Default for BackupsSection {
    fn default() -> Self {
        Self {
            retention: provision::engine::DEFAULT_BACKUP_RETENTION,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSection {
    /// Account per-user runtimes are installed for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    /// Raises the GitHub API rate limit for `latest` lookups.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
}

impl HostkitConfig {
    /// Load `path`, writing defaults there first if it does not exist.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        let config = Self::default();
        config.save(path)?;
        log::info!("Wrote default config to {}", path.display());
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid TOML format in {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))
    }

    /// Load from the resolved config directory.
    pub fn load_default() -> Result<(Self, PathBuf)> {
        let path = paths::config_file_in(&paths::config_dir()?);
        let config = Self::load_or_init(&path)?;
        Ok((config, path))
    }

    pub fn state_dir(&self) -> Result<PathBuf> {
        match &self.paths.state_dir {
            Some(dir) => Ok(paths::expand(dir)),
            None => paths::state_dir(),
        }
    }

    pub fn host_paths(&self) -> HostPaths {
        HostPaths {
            bin_dir: paths::expand(&self.paths.bin_dir),
            sources_dir: paths::expand(&self.paths.sources_dir),
            keyrings_dir: paths::expand(&self.paths.keyrings_dir),
            ..HostPaths::default()
        }
    }

    pub fn apply_options(&self) -> ApplyOptions {
        ApplyOptions {
            autoremove: self.apply.autoremove,
            remove_repositories: self.apply.remove_repositories,
            purge_data: self.apply.purge_data,
            script_audit_only: self.apply.script_audit_only,
        }
    }

    /// `GITHUB_TOKEN` wins over the config value.
    pub fn github_token(&self) -> Option<String> {
        env::var("GITHUB_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.network.github_token.clone())
    }

    /// Account name for per-user installs: explicit, config, `SUDO_USER`, `USER`.
    pub fn target_user_name(&self, explicit: Option<&str>) -> Option<String> {
        pick_user_name(
            explicit,
            self.user.name.as_deref(),
            env::var("SUDO_USER").ok().as_deref(),
            env::var("USER").ok().as_deref(),
        )
    }

    pub fn target_user(&self, explicit: Option<&str>) -> Option<TargetUser> {
        let name = self.target_user_name(explicit)?;
        let home = home_of(&name);
        Some(TargetUser { name, home })
    }
}

/// First non-empty, non-root candidate.
fn pick_user_name(
    explicit: Option<&str>,
    configured: Option<&str>,
    sudo_user: Option<&str>,
    user: Option<&str>,
) -> Option<String> {
    [explicit, configured, sudo_user, user]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|name| !name.is_empty() && *name != "root")
        .map(ToString::to_string)
}

/// Home directory from the account database, falling back to `/home/<name>`.
fn home_of(name: &str) -> PathBuf {
    let from_getent = Command::new("getent")
        .args(["passwd", name])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| parse_passwd_home(&String::from_utf8_lossy(&output.stdout)));
    from_getent.unwrap_or_else(|| PathBuf::from("/home").join(name))
}

fn parse_passwd_home(line: &str) -> Option<PathBuf> {
    let home = line.lines().next()?.split(':').nth(5)?;
    (!home.is_empty()).then(|| PathBuf::from(home))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = HostkitConfig::default();
        assert!(config.apply.autoremove);
        assert!(!config.apply.remove_repositories);
        assert_eq!(config.backups.retention, 10);
        assert_eq!(config.host_paths(), HostPaths::default());
        assert_eq!(config.apply_options(), ApplyOptions::default());
    }

    #[test]
    fn test_first_use_writes_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");

        let config = HostkitConfig::load_or_init(&path).unwrap();
        assert_eq!(config, HostkitConfig::default());
        assert!(path.exists());

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("[apply]"));
        assert!(content.contains("retention = 10"));
        assert!(!content.contains("github_token"));
    }

    #[test]
    fn test_partial_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "[apply]\nremove_repositories = true\n\n[user]\nname = \"alice\"\n",
        )
        .unwrap();

        let config = HostkitConfig::load_or_init(&path).unwrap();
        assert!(config.apply.remove_repositories);
        assert!(config.apply.autoremove);
        assert_eq!(config.user.name.as_deref(), Some("alice"));
        assert_eq!(config.backups.retention, 10);
    }

    #[test]
    fn test_invalid_toml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "[apply\nautoremove = ").unwrap();
        let err = HostkitConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_state_dir_override() {
        let mut config = HostkitConfig::default();
        config.paths.state_dir = Some("/srv/hostkit".into());
        assert_eq!(config.state_dir().unwrap(), PathBuf::from("/srv/hostkit"));
    }

    #[test]
    fn test_pick_user_name() {
        assert_eq!(
            pick_user_name(Some("bob"), Some("alice"), None, None),
            Some("bob".into())
        );
        assert_eq!(
            pick_user_name(None, None, Some("carol"), Some("root")),
            Some("carol".into())
        );
        assert_eq!(pick_user_name(None, None, None, Some("root")), None);
        assert_eq!(pick_user_name(None, Some(""), None, Some("dave")), Some("dave".into()));
    }

    #[test]
    fn test_parse_passwd_home() {
        assert_eq!(
            parse_passwd_home("alice:x:1000:1000:Alice,,,:/home/alice:/bin/bash\n"),
            Some(PathBuf::from("/home/alice"))
        );
        assert_eq!(parse_passwd_home("broken"), None);
    }
}
