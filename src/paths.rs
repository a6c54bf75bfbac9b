//! Centralized path resolution for hostkit
//!
//! Supports environment variable overrides and XDG base directories:
//!
//! | Variable             | Default                    | Description                  |
//! |----------------------|----------------------------|------------------------------|
//! | `HOSTKIT_CONFIG_DIR` | `~/.config/hostkit`        | Config directory (TOML)      |
//! | `HOSTKIT_STATE_DIR`  | `~/.local/state/hostkit`   | Selection, markers, backups  |
//!
//! Priority for each directory:
//! 1. `HOSTKIT_*_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/hostkit` or `XDG_STATE_HOME/hostkit`
//! 3. The home-relative default above

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

pub const ENV_CONFIG_DIR: &str = "HOSTKIT_CONFIG_DIR";
pub const ENV_STATE_DIR: &str = "HOSTKIT_STATE_DIR";

const APP_DIR: &str = "hostkit";
const CONFIG_FILE: &str = "config.toml";

/// Get the hostkit config directory.
pub fn config_dir() -> Result<PathBuf> {
    resolve_dir(ENV_CONFIG_DIR, "XDG_CONFIG_HOME", &[".config"])
}

/// Get the hostkit state directory.
pub fn state_dir() -> Result<PathBuf> {
    resolve_dir(ENV_STATE_DIR, "XDG_STATE_HOME", &[".local", "state"])
}

/// Full path of `config.toml` inside `dir`.
pub fn config_file_in(dir: &std::path::Path) -> PathBuf {
    dir.join(CONFIG_FILE)
}

fn resolve_dir(override_var: &str, xdg_var: &str, home_default: &[&str]) -> Result<PathBuf> {
    if let Ok(dir) = env::var(override_var)
        && !dir.is_empty()
    {
        let path = expand(&dir);
        log::debug!("Using {override_var}: {}", path.display());
        return Ok(path);
    }

    if let Ok(xdg) = env::var(xdg_var)
        && !xdg.is_empty()
    {
        let path = expand(&xdg).join(APP_DIR);
        log::debug!("Using {xdg_var}: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home_default
        .iter()
        .fold(home, |acc, part| acc.join(part))
        .join(APP_DIR);
    log::debug!("Using default dir: {}", path.display());
    Ok(path)
}

/// Expand ~ and environment variables in a path string.
///
/// Unresolvable variables leave the input as-is.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Run `f` with `key` set, restoring the previous value afterwards.
    ///
    /// # Safety
    /// Mutates the process environment; tests touching the same variable
    /// must not run concurrently.
    fn with_env_var<F, R>(key: &str, value: Option<&str>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: each test uses its own variable combination
        match value {
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        let result = f();
        match original {
            // SAFETY: see above
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    #[test]
    fn test_config_dir_env_override() {
        with_env_var(ENV_CONFIG_DIR, Some("/custom/hostkit/config"), || {
            assert_eq!(config_dir().unwrap(), PathBuf::from("/custom/hostkit/config"));
        });
    }

    #[test]
    fn test_state_dir_env_override_with_tilde() {
        let home = dirs::home_dir().unwrap();
        with_env_var(ENV_STATE_DIR, Some("~/hostkit-state-test"), || {
            assert_eq!(state_dir().unwrap(), home.join("hostkit-state-test"));
        });
    }

    #[test]
    fn test_xdg_fallback() {
        let xdg = resolve_dir("HOSTKIT_TEST_UNSET_OVERRIDE", "HOSTKIT_TEST_XDG", &[".x"]);
        let home = dirs::home_dir().unwrap();
        assert_eq!(xdg.unwrap(), home.join(".x").join("hostkit"));

        with_env_var("HOSTKIT_TEST_XDG", Some("/xdg/base"), || {
            let path =
                resolve_dir("HOSTKIT_TEST_UNSET_OVERRIDE", "HOSTKIT_TEST_XDG", &[".x"]).unwrap();
            assert_eq!(path, PathBuf::from("/xdg/base/hostkit"));
        });
    }

    #[test]
    fn test_empty_override_ignored() {
        with_env_var("HOSTKIT_TEST_EMPTY", Some(""), || {
            let path = resolve_dir("HOSTKIT_TEST_EMPTY", "HOSTKIT_TEST_XDG_EMPTY", &[".y"]).unwrap();
            assert!(path.ends_with(".y/hostkit"));
        });
    }

    #[test]
    fn test_expand() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand("~/bin"), home.join("bin"));
        assert_eq!(expand("/usr/local/bin"), PathBuf::from("/usr/local/bin"));
    }
}
