//! Operator-facing facade
//!
//! [`Engine`] owns the catalog, profiles, strategies and persisted state, and
//! exposes the operations a front end calls. Every mutation resolves fully in
//! memory and then performs one atomic save.

use crate::audit::{self, AuditReport};
use crate::catalog::Catalog;
use crate::context::{ProgressCallback, StrategyContext};
use crate::error::{Error, Result};
use crate::ledger::{Marker, MarkerLedger};
use crate::pins::Pin;
use crate::profile::{MergeMode, ProfileSet, Resolution};
use crate::reconcile::{Plan, ReconcileReport, Reconciler};
use crate::selection::{SelectionState, SelectionStore};
use crate::strategy::StrategyRegistry;
use crate::types::CatalogKey;

/// Default number of selection backups kept.
pub const DEFAULT_BACKUP_RETENTION: usize = 10;

pub struct Engine {
    catalog: Catalog,
    profiles: ProfileSet,
    registry: StrategyRegistry,
    store: SelectionStore,
    ledger: MarkerLedger,
    ctx: StrategyContext,
}

impl Engine {
    /// Build an engine, rejecting catalog and profile defects up front.
    pub fn new(
        catalog: Catalog,
        profiles: ProfileSet,
        registry: StrategyRegistry,
        ctx: StrategyContext,
        backup_retention: usize,
    ) -> Result<Self> {
        catalog.validate(&registry)?;
        profiles.validate(&catalog)?;
        let store = SelectionStore::new(
            ctx.state.selection_file(),
            ctx.state.backups_dir(),
            backup_retention,
        );
        let ledger = MarkerLedger::new(ctx.state.markers_dir());
        Ok(Self {
            catalog,
            profiles,
            registry,
            store,
            ledger,
            ctx,
        })
    }

    /// Stock catalog, profiles and strategies.
    pub fn builtin(ctx: StrategyContext, backup_retention: usize) -> Result<Self> {
        Self::new(
            Catalog::builtin()?,
            ProfileSet::builtin(),
            StrategyRegistry::builtin(),
            ctx,
            backup_retention,
        )
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn profiles(&self) -> &ProfileSet {
        &self.profiles
    }

    pub fn context(&self) -> &StrategyContext {
        &self.ctx
    }

    pub fn store(&self) -> &SelectionStore {
        &self.store
    }

    /// Current desired state, bootstrapped from catalog defaults on first use.
    pub fn selection(&self) -> Result<SelectionState> {
        self.store.load(&self.catalog)
    }

    /// Every ownership marker, sorted by key.
    pub fn ownership(&self) -> Result<Vec<Marker>> {
        let mut markers = Vec::new();
        for key in self.ledger.owned_keys()? {
            if let Some(marker) = self.ledger.marker(&key)? {
                markers.push(marker);
            }
        }
        Ok(markers)
    }

    /// Reset selection and pins to catalog defaults. Comments are kept.
    pub fn apply_defaults_replace(&self) -> Result<SelectionState> {
        self.store.update(&self.catalog, |state| {
            let comments = std::mem::take(&mut state.comments);
            *state = SelectionState::from_defaults(&self.catalog);
            state.comments = comments;
            Ok(())
        })
    }

    pub fn apply_profile(&self, name: &str, mode: MergeMode) -> Result<Resolution> {
        let current = self.store.load(&self.catalog)?;
        let resolution = self.profiles.resolve(name, mode, &current, &self.catalog)?;
        self.store.save(&self.catalog, &resolution.state)?;
        Ok(resolution)
    }

    pub fn set_selection(&self, key: &CatalogKey, on: bool) -> Result<SelectionState> {
        self.store.set(&self.catalog, key, on)
    }

    /// Make `keys` exactly the selected set.
    pub fn set_selection_bulk(&self, keys: &[CatalogKey]) -> Result<SelectionState> {
        if let Some(unknown) = keys.iter().find(|key| !self.catalog.contains(key)) {
            return Err(Error::UnknownKey(unknown.to_string()));
        }
        self.store.update(&self.catalog, |state| {
            state.clear();
            for key in keys {
                state.set(key.clone(), true);
            }
            Ok(())
        })
    }

    /// Validate and persist a pin. Accepts the persisted pin name.
    pub fn edit_version_pin(&self, pin: &str, value: &str) -> Result<SelectionState> {
        let pin: Pin = pin.parse()?;
        self.store
            .update(&self.catalog, |state| state.pins.set(pin, value))
    }

    pub fn plan(&self) -> Result<Plan> {
        let selection = self.selection()?;
        self.reconciler().plan(&selection, &self.ctx)
    }

    pub fn reconcile(&self, progress: &mut dyn ProgressCallback) -> Result<ReconcileReport> {
        let selection = self.selection()?;
        self.reconciler().reconcile(&selection, &self.ctx, progress)
    }

    pub fn audit(&self) -> Result<AuditReport> {
        let selection = self.selection()?;
        audit::audit(&self.catalog, &self.registry, &selection, &self.ctx)
    }

    fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::new(&self.catalog, &self.registry, &self.ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogEntry, Row};
    use crate::context::NoProgress;
    use crate::profile::Profile;
    use crate::strategy::testing::Harness;
    use crate::types::EntryStatus;

    fn engine(h: &Harness) -> Engine {
        let catalog = Catalog::new(vec![
            Row::Entry(CatalogEntry::package("curl", "curl").default_on()),
            Row::Entry(CatalogEntry::package("jq", "jq")),
            Row::Entry(CatalogEntry::package("htop", "htop")),
        ])
        .unwrap();
        let profiles = ProfileSet::new(vec![
            Profile::new("tools", "Tools", &["jq", "htop"]).with_pin(Pin::HelmVersion, "3.16.1"),
        ]);
        Engine::new(catalog, profiles, StrategyRegistry::builtin(), h.ctx(), 3).unwrap()
    }

    fn keys(state: &SelectionState) -> Vec<String> {
        state.selected_keys().iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_first_use_bootstraps_defaults() {
        let h = Harness::new();
        let engine = engine(&h);
        let state = engine.selection().unwrap();
        assert_eq!(state.selected_keys(), vec![CatalogKey::new("curl")]);
        assert!(engine.store().exists());
    }

    #[test]
    fn test_profile_then_defaults() {
        let h = Harness::new();
        let engine = engine(&h);

        let resolution = engine.apply_profile("tools", MergeMode::Add).unwrap();
        assert!(resolution.warnings.is_empty());
        assert_eq!(keys(&resolution.state), ["curl", "htop", "jq"]);
        assert_eq!(engine.selection().unwrap().pins.get(Pin::HelmVersion), "3.16.1");

        let state = engine.apply_defaults_replace().unwrap();
        assert_eq!(keys(&state), ["curl"]);
        assert_eq!(state.pins.get(Pin::HelmVersion), "latest");
    }

    #[test]
    fn test_unknown_profile_leaves_state_untouched() {
        let h = Harness::new();
        let engine = engine(&h);
        let before = engine.selection().unwrap();
        assert!(matches!(
            engine.apply_profile("nope", MergeMode::Replace),
            Err(Error::UnknownProfile(_))
        ));
        assert_eq!(engine.selection().unwrap().selected_keys(), before.selected_keys());
    }

    #[test]
    fn test_bulk_selection() {
        let h = Harness::new();
        let engine = engine(&h);
        let state = engine
            .set_selection_bulk(&[CatalogKey::new("jq"), CatalogKey::new("htop")])
            .unwrap();
        assert_eq!(keys(&state), ["htop", "jq"]);

        assert!(matches!(
            engine.set_selection_bulk(&[CatalogKey::new("nope")]),
            Err(Error::UnknownKey(_))
        ));
        assert_eq!(keys(&engine.selection().unwrap()), ["htop", "jq"]);
    }

    #[test]
    fn test_edit_version_pin() {
        let h = Harness::new();
        let engine = engine(&h);
        let state = engine.edit_version_pin("terraform_version", "1.9.5").unwrap();
        assert_eq!(state.pins.get(Pin::TerraformVersion), "1.9.5");

        assert!(matches!(
            engine.edit_version_pin("TERRAFORM_VERSION", "one.two"),
            Err(Error::InvalidPin { .. })
        ));
        assert!(matches!(
            engine.edit_version_pin("GO_VERSION", "1.22"),
            Err(Error::UnknownPin(_))
        ));
    }

    #[test]
    fn test_reconcile_and_ownership() {
        let h = Harness::new();
        h.apt.add_available("curl");
        let engine = engine(&h);

        let plan = engine.plan().unwrap();
        assert_eq!(plan.install, vec![CatalogKey::new("curl")]);

        let report = engine.reconcile(&mut NoProgress).unwrap();
        assert!(report.is_success());
        assert_eq!(report.outcomes[0].status, EntryStatus::Installed);

        let owned: Vec<CatalogKey> = engine.ownership().unwrap().into_iter().map(|m| m.key).collect();
        assert_eq!(owned, vec![CatalogKey::new("curl")]);
        assert!(engine.audit().unwrap().passed);
    }

    #[test]
    fn test_invalid_profile_rejected_at_construction() {
        let h = Harness::new();
        let catalog = Catalog::new(vec![Row::Entry(CatalogEntry::package("curl", "curl"))]).unwrap();
        let profiles = ProfileSet::new(vec![Profile::new("bad", "Bad", &["ghost"])]);
        let err = Engine::new(catalog, profiles, StrategyRegistry::builtin(), h.ctx(), 3)
            .err()
            .unwrap();
        assert!(err.is_config_error());
    }
}
