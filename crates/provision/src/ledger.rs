//! Marker ledger: which catalog items this tool installed
//!
//! One JSON file per owned key under `markers/`. A marker records what the
//! install actually produced so removal and verification never have to
//! guess. Keys without a marker are never removed by the reconciler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{CatalogKey, StrategyTag};

/// Current on-disk marker format.
pub const MARKER_SCHEMA_VERSION: u32 = 1;

/// What an install left on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ArtifactSnapshot {
    /// Native packages that were missing and got installed.
    Packages { packages: Vec<String> },
    Binary {
        path: PathBuf,
        version: String,
        sha256: String,
    },
    Script {
        script_url: String,
        sha256: String,
        removal_script: PathBuf,
    },
    RuntimeManager {
        user: String,
        manager_dir: PathBuf,
        runtime_version: String,
        profile_files: Vec<PathBuf>,
    },
    LanguageSelect { target: String, packages: Vec<String> },
}

impl ArtifactSnapshot {
    /// Native packages this artifact accounts for, if any.
    pub fn packages(&self) -> &[String] {
        match self {
            Self::Packages { packages } | Self::LanguageSelect { packages, .. } => packages,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub schema_version: u32,
    pub key: CatalogKey,
    pub installed_at: DateTime<Utc>,
    pub strategy: StrategyTag,
    pub artifact: ArtifactSnapshot,
}

#[derive(Debug, Clone)]
pub struct MarkerLedger {
    dir: PathBuf,
}

impl MarkerLedger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &CatalogKey) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    pub fn is_owned(&self, key: &CatalogKey) -> bool {
        self.path_for(key).is_file()
    }

    /// Record ownership, replacing any previous marker for the key.
    pub fn mark(
        &self,
        key: &CatalogKey,
        strategy: StrategyTag,
        artifact: ArtifactSnapshot,
    ) -> Result<Marker> {
        fs::create_dir_all(&self.dir).map_err(|e| Error::io(&self.dir, e))?;

        let marker = Marker {
            schema_version: MARKER_SCHEMA_VERSION,
            key: key.clone(),
            installed_at: Utc::now(),
            strategy,
            artifact,
        };
        let path = self.path_for(key);
        let json = serde_json::to_vec_pretty(&marker).map_err(|source| Error::Json {
            path: path.clone(),
            source,
        })?;

        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp);
            return Err(Error::io(&tmp, e));
        }
        fs::rename(&tmp, &path).map_err(|e| Error::io(&path, e))?;
        log::debug!("marked {key} as owned");
        Ok(marker)
    }

    /// Drop ownership. Returns whether a marker existed.
    pub fn unmark(&self, key: &CatalogKey) -> Result<bool> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                log::debug!("unmarked {key}");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::io(&path, e)),
        }
    }

    pub fn marker(&self, key: &CatalogKey) -> Result<Option<Marker>> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(&path, e)),
        };

        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|source| Error::Json {
                path: path.clone(),
                source,
            })?;
        let version = value
            .get("schema_version")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);
        if version != u64::from(MARKER_SCHEMA_VERSION) {
            return Err(Error::MarkerSchema {
                path,
                version: u32::try_from(version).unwrap_or(u32::MAX),
            });
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|source| Error::Json { path, source })
    }

    pub fn snapshot_for(&self, key: &CatalogKey) -> Result<ArtifactSnapshot> {
        self.marker(key)?
            .map(|m| m.artifact)
            .ok_or_else(|| Error::NotOwned(key.clone()))
    }

    /// Every owned key, sorted.
    pub fn owned_keys(&self) -> Result<Vec<CatalogKey>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(&self.dir, e)),
        };
        let mut keys: Vec<CatalogKey> = entries
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name();
                let name = name.to_str()?;
                if name.starts_with('.') {
                    return None;
                }
                name.strip_suffix(".json").map(CatalogKey::from)
            })
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ledger(temp: &TempDir) -> MarkerLedger {
        MarkerLedger::new(temp.path().join("markers"))
    }

    #[test]
    fn test_mark_and_read_back() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp);
        let key = CatalogKey::new("helm");

        assert!(!ledger.is_owned(&key));
        let artifact = ArtifactSnapshot::Binary {
            path: "/usr/local/bin/helm".into(),
            version: "3.16.1".into(),
            sha256: "ab".repeat(32),
        };
        ledger
            .mark(&key, StrategyTag::StandaloneBinary, artifact.clone())
            .unwrap();

        assert!(ledger.is_owned(&key));
        assert_eq!(ledger.snapshot_for(&key).unwrap(), artifact);
        let marker = ledger.marker(&key).unwrap().unwrap();
        assert_eq!(marker.schema_version, MARKER_SCHEMA_VERSION);
        assert_eq!(marker.strategy, StrategyTag::StandaloneBinary);
    }

    #[test]
    fn test_marker_json_shape() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp);
        let key = CatalogKey::new("jq");
        ledger
            .mark(
                &key,
                StrategyTag::NativePackage,
                ArtifactSnapshot::Packages {
                    packages: vec!["jq".into()],
                },
            )
            .unwrap();

        let text = fs::read_to_string(ledger.dir().join("jq.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["schema_version"], 1);
        assert_eq!(json["strategy"], "native-package");
        assert_eq!(json["artifact"]["kind"], "packages");
        assert_eq!(json["artifact"]["packages"][0], "jq");
    }

    #[test]
    fn test_unmark() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp);
        let key = CatalogKey::new("jq");
        ledger
            .mark(&key, StrategyTag::NativePackage, ArtifactSnapshot::Packages { packages: vec![] })
            .unwrap();

        assert!(ledger.unmark(&key).unwrap());
        assert!(!ledger.unmark(&key).unwrap());
        assert!(matches!(ledger.snapshot_for(&key), Err(Error::NotOwned(_))));
    }

    #[test]
    fn test_owned_keys_sorted_and_missing_dir() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp);
        assert!(ledger.owned_keys().unwrap().is_empty());

        for key in ["tmux", "curl", "helm"] {
            ledger
                .mark(
                    &CatalogKey::new(key),
                    StrategyTag::NativePackage,
                    ArtifactSnapshot::Packages { packages: vec![key.into()] },
                )
                .unwrap();
        }
        let keys: Vec<String> = ledger
            .owned_keys()
            .unwrap()
            .into_iter()
            .map(|k| k.to_string())
            .collect();
        assert_eq!(keys, vec!["curl", "helm", "tmux"]);
    }

    #[test]
    fn test_unknown_schema_version_rejected() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp);
        fs::create_dir_all(ledger.dir()).unwrap();
        fs::write(
            ledger.dir().join("docker.json"),
            r#"{"schema_version": 7, "key": "docker"}"#,
        )
        .unwrap();

        let err = ledger.marker(&CatalogKey::new("docker")).unwrap_err();
        assert!(matches!(err, Error::MarkerSchema { version: 7, .. }));
    }
}
