//! Core types shared across the engine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Identifier of a catalog entry, stable across releases.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogKey(String);

impl CatalogKey {
    /// Create a key. Keys are lowercase identifiers such as `curl` or `docker`.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the selection flag for this key: `SEL_` + upper-cased key,
    /// with `-` and `.` mapped to `_`.
    pub fn selection_var(&self) -> String {
        let mut var = String::with_capacity(self.0.len() + 4);
        var.push_str("SEL_");
        for c in self.0.chars() {
            match c {
                '-' | '.' => var.push('_'),
                c => var.push(c.to_ascii_uppercase()),
            }
        }
        var
    }
}

impl fmt::Display for CatalogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CatalogKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for CatalogKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Install/remove behaviour attached to a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyTag {
    NativePackage,
    VendorRepository,
    StandaloneBinary,
    ScriptedInstaller,
    PerUserRuntimeManager,
    LanguageVersionSelect,
}

impl StrategyTag {
    pub const ALL: [StrategyTag; 6] = [
        StrategyTag::NativePackage,
        StrategyTag::VendorRepository,
        StrategyTag::StandaloneBinary,
        StrategyTag::ScriptedInstaller,
        StrategyTag::PerUserRuntimeManager,
        StrategyTag::LanguageVersionSelect,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NativePackage => "native-package",
            Self::VendorRepository => "vendor-repository",
            Self::StandaloneBinary => "standalone-binary",
            Self::ScriptedInstaller => "scripted-installer",
            Self::PerUserRuntimeManager => "per-user-runtime-manager",
            Self::LanguageVersionSelect => "language-version-select",
        }
    }

    /// Whether entries with this strategy go through the single package
    /// manager transaction.
    pub fn is_batchable(&self) -> bool {
        matches!(self, Self::NativePackage | Self::VendorRepository)
    }
}

impl fmt::Display for StrategyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| Error::UnknownStrategy(s.to_string()))
    }
}

/// What the reconciler attempted for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Install,
    Remove,
    Keep,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Install => "install",
            Self::Remove => "remove",
            Self::Keep => "keep",
        })
    }
}

/// Final status of one entry after a reconcile run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum EntryStatus {
    Installed,
    Removed,
    Unchanged,
    Skipped { reason: String },
    Failed { error: String },
}

impl EntryStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn is_change(&self) -> bool {
        matches!(self, Self::Installed | Self::Removed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Installed => "installed",
            Self::Removed => "removed",
            Self::Unchanged => "unchanged",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Per-entry result collected during a reconcile run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryOutcome {
    pub key: CatalogKey,
    pub strategy: StrategyTag,
    pub action: Action,
    #[serde(flatten)]
    pub status: EntryStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl EntryOutcome {
    pub fn new(key: CatalogKey, strategy: StrategyTag, action: Action, status: EntryStatus) -> Self {
        Self {
            key,
            strategy,
            action,
            status,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// Counts per status for a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub installed: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.installed + self.removed
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn total(&self) -> usize {
        self.installed + self.removed + self.unchanged + self.skipped + self.failed
    }

    pub fn add(&mut self, status: &EntryStatus) {
        match status {
            EntryStatus::Installed => self.installed += 1,
            EntryStatus::Removed => self.removed += 1,
            EntryStatus::Unchanged => self.unchanged += 1,
            EntryStatus::Skipped { .. } => self.skipped += 1,
            EntryStatus::Failed { .. } => self.failed += 1,
        }
    }

    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a EntryOutcome>) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            summary.add(&outcome.status);
        }
        summary
    }
}
