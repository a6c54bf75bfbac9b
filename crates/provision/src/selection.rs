//! Selection store: the operator's desired state
//!
//! Persisted as `selection.env`, a line-oriented file of `PIN="value"`
//! records followed by one `SEL_<KEY>=1|0` flag per catalog entry. Comment
//! lines other than the generated header survive rewrites.

use chrono::{Local, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::pins::{Pin, VersionPins};
use crate::types::CatalogKey;

const HEADER: &str = "# hostkit selection state";
const WRITTEN_PREFIX: &str = "# written ";

/// Desired state: which keys are wanted, plus version pins.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionState {
    selected: BTreeMap<CatalogKey, bool>,
    pub pins: VersionPins,
    /// Operator comments carried across rewrites.
    pub comments: Vec<String>,
}

impl SelectionState {
    /// Catalog defaults and default pins.
    pub fn from_defaults(catalog: &Catalog) -> Self {
        Self {
            selected: catalog
                .entries()
                .map(|e| (e.key.clone(), e.default_selected))
                .collect(),
            pins: VersionPins::defaults(),
            comments: Vec::new(),
        }
    }

    /// Absent keys read as not selected.
    pub fn get(&self, key: &CatalogKey) -> bool {
        self.selected.get(key).copied().unwrap_or(false)
    }

    pub fn set(&mut self, key: CatalogKey, on: bool) {
        self.selected.insert(key, on);
    }

    /// Deselect everything.
    pub fn clear(&mut self) {
        for value in self.selected.values_mut() {
            *value = false;
        }
    }

    pub fn selected_keys(&self) -> Vec<CatalogKey> {
        self.selected
            .iter()
            .filter(|(_, on)| **on)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Parse the persisted form. Unknown keys and pins are ignored;
    /// malformed pin values fall back to the default.
    pub fn parse(text: &str, catalog: &Catalog) -> Self {
        let by_var: HashMap<String, CatalogKey> = catalog
            .entries()
            .map(|e| (e.key.selection_var(), e.key.clone()))
            .collect();

        let mut state = Self {
            selected: catalog.entries().map(|e| (e.key.clone(), false)).collect(),
            pins: VersionPins::defaults(),
            comments: Vec::new(),
        };

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('#') {
                if line != HEADER && !line.starts_with(WRITTEN_PREFIX) {
                    state.comments.push(line.to_string());
                }
                continue;
            }
            let Some((name, raw)) = line.split_once('=') else {
                log::debug!("ignoring selection line without '=': {line}");
                continue;
            };
            let name = name.trim().trim_start_matches("export ").trim();
            let value = unquote(raw.trim());

            if name.starts_with("SEL_") {
                match by_var.get(name) {
                    Some(key) => state.set(key.clone(), parse_flag(value)),
                    None => log::debug!("ignoring unknown selection {name}"),
                }
            } else {
                match name.parse::<Pin>() {
                    Ok(pin) => {
                        state.pins.set_or_warn(pin, value);
                    }
                    Err(_) => log::debug!("ignoring unknown setting {name}"),
                }
            }
        }
        state
    }

    /// Render the persisted form, one flag per catalog entry in catalog order.
    pub fn render(&self, catalog: &Catalog) -> String {
        let mut out = String::new();
        out.push_str(HEADER);
        out.push('\n');
        out.push_str(WRITTEN_PREFIX);
        out.push_str(&Utc::now().to_rfc3339());
        out.push('\n');
        for comment in &self.comments {
            out.push_str(comment);
            out.push('\n');
        }
        out.push('\n');
        for (pin, value) in self.pins.iter() {
            out.push_str(&format!("{}=\"{value}\"\n", pin.name()));
        }
        out.push('\n');
        for entry in catalog.entries() {
            let flag = if self.get(&entry.key) { 1 } else { 0 };
            out.push_str(&format!("{}={flag}\n", entry.key.selection_var()));
        }
        out
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Reads and atomically writes `selection.env`.
#[derive(Debug, Clone)]
pub struct SelectionStore {
    path: PathBuf,
    backups_dir: PathBuf,
    retention: usize,
}

impl SelectionStore {
    pub fn new(path: impl Into<PathBuf>, backups_dir: impl Into<PathBuf>, retention: usize) -> Self {
        Self {
            path: path.into(),
            backups_dir: backups_dir.into(),
            retention: retention.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the state, bootstrapping and persisting catalog defaults on first use.
    pub fn load(&self, catalog: &Catalog) -> Result<SelectionState> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(SelectionState::parse(&text, catalog)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!(
                    "no selection state at {}, writing catalog defaults",
                    self.path.display()
                );
                let state = SelectionState::from_defaults(catalog);
                self.save(catalog, &state)?;
                Ok(state)
            }
            Err(e) => Err(Error::io(&self.path, e)),
        }
    }

    /// Back up the previous file, then write-and-rename the new one.
    pub fn save(&self, catalog: &Catalog, state: &SelectionState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        if self.path.exists() {
            self.backup()?;
        }

        let tmp = self.path.with_extension("env.tmp");
        let contents = state.render(catalog);
        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(contents.as_bytes())?;
            file.sync_all()
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp);
            return Err(Error::io(&tmp, e));
        }
        fs::rename(&tmp, &self.path).map_err(|e| Error::io(&self.path, e))
    }

    /// Load, mutate, save. Nothing is written if `f` fails.
    pub fn update<F>(&self, catalog: &Catalog, f: F) -> Result<SelectionState>
    where
        F: FnOnce(&mut SelectionState) -> Result<()>,
    {
        let mut state = self.load(catalog)?;
        f(&mut state)?;
        self.save(catalog, &state)?;
        Ok(state)
    }

    pub fn get(&self, catalog: &Catalog, key: &CatalogKey) -> Result<bool> {
        catalog.entry(key)?;
        Ok(self.load(catalog)?.get(key))
    }

    pub fn set(&self, catalog: &Catalog, key: &CatalogKey, on: bool) -> Result<SelectionState> {
        catalog.entry(key)?;
        self.update(catalog, |state| {
            state.set(key.clone(), on);
            Ok(())
        })
    }

    fn backup(&self) -> Result<()> {
        fs::create_dir_all(&self.backups_dir).map_err(|e| Error::io(&self.backups_dir, e))?;

        let stamp = Local::now().format("%Y%m%dT%H%M%S").to_string();
        let mut target = self.backups_dir.join(format!("selection-{stamp}.env"));
        let mut n = 1;
        while target.exists() {
            target = self.backups_dir.join(format!("selection-{stamp}-{n}.env"));
            n += 1;
        }
        fs::copy(&self.path, &target).map_err(|e| Error::io(&target, e))?;
        self.prune_backups()
    }

    /// Backups, oldest first.
    ///
    /// Ordered by the stamp in the file name, then by the collision suffix,
    /// so copies taken within the same second keep their creation order.
    pub fn backups(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.backups_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(&self.backups_dir, e)),
        };
        let mut backups: Vec<((String, u32), PathBuf)> = entries
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter_map(|path| {
                let order = path.file_name().and_then(|n| n.to_str()).and_then(backup_order)?;
                Some((order, path))
            })
            .collect();
        backups.sort();
        Ok(backups.into_iter().map(|(_, path)| path).collect())
    }

    fn prune_backups(&self) -> Result<()> {
        let backups = self.backups()?;
        if backups.len() > self.retention {
            for old in &backups[..backups.len() - self.retention] {
                fs::remove_file(old).map_err(|e| Error::io(old, e))?;
            }
        }
        Ok(())
    }
}

/// Sort key of a `selection-<stamp>[-<n>].env` file name.
fn backup_order(name: &str) -> Option<(String, u32)> {
    let body = name.strip_prefix("selection-")?.strip_suffix(".env")?;
    match body.split_once('-') {
        Some((stamp, n)) => Some((stamp.to_string(), n.parse().ok()?)),
        None => Some((body.to_string(), 0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogEntry, Row};
    use tempfile::TempDir;

    fn catalog() -> Catalog {
        Catalog::new(vec![
            Row::Heading("Base".into()),
            Row::Entry(CatalogEntry::package("curl", "curl").default_on()),
            Row::Entry(CatalogEntry::package("jq", "jq")),
            Row::Entry(
                CatalogEntry::new("build-essential", "Build tools", crate::StrategyTag::NativePackage)
                    .packages(&["build-essential"]),
            ),
        ])
        .unwrap()
    }

    fn store(temp: &TempDir, retention: usize) -> SelectionStore {
        SelectionStore::new(
            temp.path().join("selection.env"),
            temp.path().join("backups"),
            retention,
        )
    }

    #[test]
    fn test_first_load_bootstraps_defaults() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp, 10);
        let catalog = catalog();

        assert!(!store.exists());
        let state = store.load(&catalog).unwrap();
        assert!(store.exists());
        assert_eq!(state.selected_keys(), vec![CatalogKey::new("curl")]);
        assert_eq!(state.pins, VersionPins::defaults());
    }

    #[test]
    fn test_save_load_is_fixed_point() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp, 10);
        let catalog = catalog();

        let mut state = store.load(&catalog).unwrap();
        state.set(CatalogKey::new("build-essential"), true);
        state.pins.set(Pin::HelmVersion, "v3.16.1").unwrap();
        state.comments.push("# pinned for the lab cluster".into());
        store.save(&catalog, &state).unwrap();

        let loaded = store.load(&catalog).unwrap();
        store.save(&catalog, &loaded).unwrap();
        let reloaded = store.load(&catalog).unwrap();

        assert_eq!(loaded, state);
        assert_eq!(reloaded, loaded);
    }

    #[test]
    fn test_render_format() {
        let catalog = catalog();
        let mut state = SelectionState::from_defaults(&catalog);
        state.set(CatalogKey::new("build-essential"), true);
        let text = state.render(&catalog);

        assert!(text.starts_with("# hostkit selection state\n# written "));
        assert!(text.contains("TERRAFORM_VERSION=\"latest\"\n"));
        assert!(text.contains("PYTHON_TARGET=\"system\"\n"));
        assert!(text.contains("SEL_CURL=1\n"));
        assert!(text.contains("SEL_JQ=0\n"));
        assert!(text.contains("SEL_BUILD_ESSENTIAL=1\n"));
    }

    #[test]
    fn test_parse_ignores_unknown_and_bad_pins() {
        let catalog = catalog();
        let text = "\
# hostkit selection state
# written 2024-01-01T00:00:00+00:00
# keep jq on the bastion
SEL_CURL=0
SEL_JQ=1
SEL_RETIRED_TOOL=1
GO_VERSION=\"1.22\"
HELM_VERSION=\"not-a-version\"
TERRAFORM_VERSION='1.9.5'
";
        let state = SelectionState::parse(text, &catalog);
        assert!(!state.get(&CatalogKey::new("curl")));
        assert!(state.get(&CatalogKey::new("jq")));
        assert!(!state.get(&CatalogKey::new("retired-tool")));
        assert_eq!(state.pins.get(Pin::HelmVersion), "latest");
        assert_eq!(state.pins.get(Pin::TerraformVersion), "1.9.5");
        assert_eq!(state.comments, vec!["# keep jq on the bastion"]);
    }

    #[test]
    fn test_absent_key_is_not_selected() {
        let catalog = catalog();
        let state = SelectionState::parse("SEL_CURL=1\n", &catalog);
        assert!(!state.get(&CatalogKey::new("jq")));
    }

    #[test]
    fn test_save_takes_backup_and_prunes() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp, 2);
        let catalog = catalog();

        let mut state = store.load(&catalog).unwrap();
        for on in [true, false, true, false] {
            state.set(CatalogKey::new("jq"), on);
            store.save(&catalog, &state).unwrap();
        }

        let backups = store.backups().unwrap();
        assert_eq!(backups.len(), 2);
        assert!(!temp.path().join("selection.env.tmp").exists());
    }

    #[test]
    fn test_backups_order_by_stamp_then_suffix() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp, 2);
        let catalog = catalog();
        let state = store.load(&catalog).unwrap();

        let dir = temp.path().join("backups");
        fs::create_dir_all(&dir).unwrap();
        for name in [
            "selection-20240101T000000-10.env",
            "selection-20240101T000000-2.env",
            "selection-20240101T000000.env",
            "notes.txt",
        ] {
            fs::write(dir.join(name), "").unwrap();
        }
        assert_eq!(
            store.backups().unwrap(),
            vec![
                dir.join("selection-20240101T000000.env"),
                dir.join("selection-20240101T000000-2.env"),
                dir.join("selection-20240101T000000-10.env"),
            ]
        );

        store.save(&catalog, &state).unwrap();
        let backups = store.backups().unwrap();
        assert_eq!(backups.len(), 2);
        assert_eq!(backups[0], dir.join("selection-20240101T000000-10.env"));
        assert!(dir.join("notes.txt").exists());
    }

    #[test]
    fn test_update_failure_does_not_write() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp, 10);
        let catalog = catalog();
        store.load(&catalog).unwrap();
        let before = fs::read_to_string(store.path()).unwrap();

        let result = store.update(&catalog, |state| {
            state.set(CatalogKey::new("jq"), true);
            Err(Error::UnknownProfile("nope".into()))
        });
        assert!(result.is_err());
        assert_eq!(fs::read_to_string(store.path()).unwrap(), before);
    }

    #[test]
    fn test_set_unknown_key() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp, 10);
        let err = store
            .set(&catalog(), &CatalogKey::new("emacs"), true)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownKey(_)));
    }

    #[test]
    fn test_set_and_get() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp, 10);
        let catalog = catalog();
        let key = CatalogKey::new("jq");
        assert!(!store.get(&catalog, &key).unwrap());
        store.set(&catalog, &key, true).unwrap();
        assert!(store.get(&catalog, &key).unwrap());
    }
}
