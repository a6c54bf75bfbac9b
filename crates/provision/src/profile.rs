//! Named selection bundles
//!
//! A profile is a set of catalog keys plus pin overrides. Applying one
//! produces a new [`SelectionState`] in memory; the caller persists it with
//! a single save so a failed resolution leaves nothing half-written.

use std::fmt;
use std::str::FromStr;

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::pins::{Pin, VersionPins};
use crate::selection::SelectionState;
use crate::types::CatalogKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub description: String,
    pub keys: Vec<CatalogKey>,
    /// Raw override values; malformed ones are skipped with a warning.
    pub pin_overrides: Vec<(Pin, String)>,
}

impl Profile {
    pub fn new(name: &str, description: &str, keys: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            keys: keys.iter().map(|k| CatalogKey::new(*k)).collect(),
            pin_overrides: Vec::new(),
        }
    }

    pub fn with_pin(mut self, pin: Pin, value: &str) -> Self {
        self.pin_overrides.push((pin, value.to_string()));
        self
    }
}

/// How a profile combines with the current selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMode {
    /// Selection becomes exactly the profile; pins reset to defaults first.
    #[default]
    Replace,
    /// Profile keys are switched on; everything else is kept.
    Add,
}

impl fmt::Display for MergeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Replace => "replace",
            Self::Add => "add",
        })
    }
}

impl FromStr for MergeMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "add" | "merge" => Ok(Self::Add),
            other => Err(format!("unknown merge mode '{other}' (expected replace or add)")),
        }
    }
}

/// A resolved selection and any pin overrides that were rejected.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub state: SelectionState,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProfileSet {
    profiles: Vec<Profile>,
}

impl ProfileSet {
    pub fn new(profiles: Vec<Profile>) -> Self {
        Self { profiles }
    }

    pub fn builtin() -> Self {
        Self::new(vec![
            Profile::new("minimal", "Just the basics", &["curl", "git", "jq"]),
            Profile::new(
                "control-plane",
                "Workstation for driving infrastructure",
                &[
                    "curl", "git", "jq", "openssh", "kubectl", "helm", "terraform", "ansible",
                    "sops", "age", "gh",
                ],
            ),
            Profile::new(
                "docker-host",
                "Container host with remote access",
                &["curl", "git", "jq", "htop", "openssh", "docker", "tailscale"],
            ),
            Profile::new(
                "developer",
                "Local development with per-user runtimes",
                &[
                    "curl", "git", "jq", "htop", "tmux", "build-essential", "gh", "pyenv", "node",
                    "python",
                ],
            )
            .with_pin(Pin::PythonTarget, "pyenv"),
        ])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.profiles.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Result<&Profile> {
        self.profiles
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| Error::UnknownProfile(name.to_string()))
    }

    /// Every profile key must exist in the catalog.
    pub fn validate(&self, catalog: &Catalog) -> Result<()> {
        for profile in &self.profiles {
            check_keys(profile, catalog)?;
        }
        Ok(())
    }

    /// Resolve a named profile against the current selection.
    pub fn resolve(
        &self,
        name: &str,
        mode: MergeMode,
        current: &SelectionState,
        catalog: &Catalog,
    ) -> Result<Resolution> {
        resolve(self.get(name)?, mode, current, catalog)
    }
}

fn check_keys(profile: &Profile, catalog: &Catalog) -> Result<()> {
    match profile.keys.iter().find(|key| !catalog.contains(key)) {
        Some(key) => Err(Error::ProfileReferencesUnknownKey {
            profile: profile.name.clone(),
            key: key.to_string(),
        }),
        None => Ok(()),
    }
}

/// Apply `profile` to `current` without touching disk.
pub fn resolve(
    profile: &Profile,
    mode: MergeMode,
    current: &SelectionState,
    catalog: &Catalog,
) -> Result<Resolution> {
    check_keys(profile, catalog)?;

    let mut state = current.clone();
    if mode == MergeMode::Replace {
        state.clear();
        state.pins = VersionPins::defaults();
    }
    for key in &profile.keys {
        state.set(key.clone(), true);
    }

    let warnings = profile
        .pin_overrides
        .iter()
        .filter_map(|(pin, value)| state.pins.set_or_warn(*pin, value))
        .map(|w| format!("profile {}: {w}", profile.name))
        .collect();

    log::info!("resolved profile {} ({mode})", profile.name);
    Ok(Resolution { state, warnings })
}
