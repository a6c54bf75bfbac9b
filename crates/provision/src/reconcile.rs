//! Desired vs. owned reconciliation
//!
//! One run walks the catalog in four passes: batched package installs,
//! individual installs, individual removals, batched removals. Installs come
//! first so swapping one profile for another over-provisions briefly rather
//! than under-provisions. Only keys with a marker are ever removed.
//!
//! Entry failures are collected into the [`ReconcileReport`]; only catalog
//! defects (unknown strategy) abort the run.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::audit::{self, AuditReport};
use crate::catalog::{Catalog, CatalogEntry};
use crate::context::{Phase, ProgressCallback, StrategyContext};
use crate::error::{Result, Severity, StrategyError};
use crate::ledger::{ArtifactSnapshot, Marker, MarkerLedger};
use crate::pins::VersionPins;
use crate::selection::SelectionState;
use crate::strategy::native::unavailable_warnings;
use crate::strategy::{AuditStatus, InstallReport, StrategyRegistry};
use crate::types::{Action, CatalogKey, EntryOutcome, EntryStatus, RunSummary};

/// What `reconcile` would do, computed without side effects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    /// Desired and not satisfied: a run installs or reinstalls it.
    pub install: Vec<CatalogKey>,
    /// Owned but no longer desired.
    pub remove: Vec<CatalogKey>,
    /// Desired and already satisfied, owned or not: a run leaves it alone.
    pub unchanged: Vec<CatalogKey>,
    /// Deselected, present on the host, but not ours: left alone.
    pub not_owned: Vec<CatalogKey>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.install.is_empty() && self.remove.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    /// One outcome per attempted entry, in catalog order.
    pub outcomes: Vec<EntryOutcome>,
    /// Run-level warnings not tied to a single entry.
    pub warnings: Vec<String>,
    pub audit: AuditReport,
    pub summary: RunSummary,
}

impl ReconcileReport {
    /// No failed entry and no missing artifact after the audit.
    pub fn is_success(&self) -> bool {
        self.summary.is_success() && self.audit.passed
    }

    pub fn outcome(&self, key: &CatalogKey) -> Option<&EntryOutcome> {
        self.outcomes.iter().find(|o| &o.key == key)
    }
}

/// A catalog entry with its desired flag and ownership record.
struct Tracked<'c> {
    entry: &'c CatalogEntry,
    desired: bool,
    marker: Option<Marker>,
}

impl Tracked<'_> {
    fn outcome(&self, action: Action, status: EntryStatus) -> EntryOutcome {
        EntryOutcome::new(self.entry.key.clone(), self.entry.strategy, action, status)
    }
}

/// A batchable entry with the packages it is missing before the transaction.
struct BatchItem<'t, 'c> {
    tracked: &'t Tracked<'c>,
    missing: Vec<String>,
}

/// Outcome collection plus progress forwarding.
struct Run<'p> {
    progress: &'p mut dyn ProgressCallback,
    outcomes: Vec<EntryOutcome>,
    warnings: Vec<String>,
}

impl<'p> Run<'p> {
    fn new(progress: &'p mut dyn ProgressCallback) -> Self {
        Self {
            progress,
            outcomes: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn phase(&mut self, phase: Phase) {
        log::debug!("phase: {}", phase.label());
        self.progress.on_phase(phase);
    }

    fn start(&mut self, key: &CatalogKey, action: Action) {
        self.progress.on_entry_start(key, action);
    }

    fn record(&mut self, outcome: EntryOutcome) {
        match &outcome.status {
            EntryStatus::Failed { error } => log::warn!("{}: {error}", outcome.key),
            EntryStatus::Skipped { reason } => log::info!("{}: skipped: {reason}", outcome.key),
            status if status.is_change() => log::info!("{}: {}", outcome.key, status.label()),
            status => log::debug!("{}: {}", outcome.key, status.label()),
        }
        self.progress.on_entry_complete(&outcome);
        self.outcomes.push(outcome);
    }

    fn warn(&mut self, message: String) {
        log::warn!("{message}");
        self.warnings.push(message);
    }

    fn finish(mut self, catalog: &Catalog, audit: AuditReport) -> ReconcileReport {
        let order: HashMap<&CatalogKey, usize> = catalog
            .entries()
            .enumerate()
            .map(|(i, entry)| (&entry.key, i))
            .collect();
        self.outcomes
            .sort_by_key(|o| order.get(&o.key).copied().unwrap_or(usize::MAX));
        let summary = RunSummary::from_outcomes(&self.outcomes);
        ReconcileReport {
            outcomes: self.outcomes,
            warnings: self.warnings,
            audit,
            summary,
        }
    }
}

fn status_for(err: &StrategyError) -> EntryStatus {
    match err.severity() {
        Severity::Skippable => EntryStatus::Skipped {
            reason: err.to_string(),
        },
        Severity::EntryFatal | Severity::RunFatal => EntryStatus::Failed {
            error: err.to_string(),
        },
    }
}

fn failed(error: impl ToString) -> EntryStatus {
    EntryStatus::Failed {
        error: error.to_string(),
    }
}

pub struct Reconciler<'a> {
    catalog: &'a Catalog,
    registry: &'a StrategyRegistry,
    ledger: &'a MarkerLedger,
}

impl<'a> Reconciler<'a> {
    pub fn new(catalog: &'a Catalog, registry: &'a StrategyRegistry, ledger: &'a MarkerLedger) -> Self {
        Self {
            catalog,
            registry,
            ledger,
        }
    }

    /// Dry run. Reads markers and queries the host, changes nothing.
    ///
    /// Each entry is classified by the same checks `reconcile` makes before
    /// acting, so an entry listed as unchanged is one a run would not touch.
    pub fn plan(&self, selection: &SelectionState, ctx: &StrategyContext) -> Result<Plan> {
        self.catalog.validate(self.registry)?;
        let mut plan = Plan::default();
        for entry in self.catalog.entries() {
            let key = entry.key.clone();
            let installer = self.registry.get(entry.strategy)?;
            if !selection.get(&entry.key) {
                if self.ledger.is_owned(&entry.key) {
                    plan.remove.push(key);
                } else if installer.audit(entry, &selection.pins, ctx).status == AuditStatus::Ok {
                    plan.not_owned.push(key);
                }
                continue;
            }

            let marker = if entry.strategy.is_batchable() {
                None
            } else {
                self.ledger.marker(&entry.key).unwrap_or_else(|e| {
                    log::warn!("{key}: {e}");
                    None
                })
            };
            let changes = match marker {
                Some(marker) => installer
                    .verify(entry, &marker.artifact, &selection.pins, ctx)
                    .map(|ok| !ok),
                None => installer.would_install(entry, &selection.pins, ctx),
            };
            match changes {
                Ok(false) => plan.unchanged.push(key),
                Ok(true) => plan.install.push(key),
                Err(e) => {
                    log::warn!("{key}: cannot tell whether an install is needed: {e}");
                    plan.install.push(key);
                }
            }
        }
        Ok(plan)
    }

    /// Converge the host toward `selection`, then audit it.
    pub fn reconcile(
        &self,
        selection: &SelectionState,
        ctx: &StrategyContext,
        progress: &mut dyn ProgressCallback,
    ) -> Result<ReconcileReport> {
        self.catalog.validate(self.registry)?;
        let mut run = Run::new(progress);
        let tracked = self.track(selection, &mut run);
        self.check_foreign_markers(&mut run);

        let pins = &selection.pins;
        self.install_batch(&tracked, ctx, &mut run);
        self.install_individual(&tracked, pins, ctx, &mut run);
        self.remove_individual(&tracked, ctx, &mut run);
        self.remove_batch(&tracked, ctx, &mut run);

        if ctx.options.autoremove {
            run.phase(Phase::Autoremove);
            if let Err(e) = ctx.packages.autoremove() {
                run.warn(format!("autoremove failed: {e}"));
            }
        }

        run.phase(Phase::Audit);
        let audit = audit::audit(self.catalog, self.registry, selection, ctx)?;
        Ok(run.finish(self.catalog, audit))
    }

    /// Pair every relevant entry with its marker. Entries that are neither
    /// desired nor owned need no work and are dropped here.
    fn track(&self, selection: &SelectionState, run: &mut Run<'_>) -> Vec<Tracked<'a>> {
        let mut tracked = Vec::new();
        for entry in self.catalog.entries() {
            let desired = selection.get(&entry.key);
            match self.ledger.marker(&entry.key) {
                Ok(None) if !desired => {}
                Ok(marker) => tracked.push(Tracked {
                    entry,
                    desired,
                    marker,
                }),
                Err(e) => {
                    let action = if desired { Action::Install } else { Action::Remove };
                    run.record(EntryOutcome::new(
                        entry.key.clone(),
                        entry.strategy,
                        action,
                        failed(e),
                    ));
                }
            }
        }
        tracked
    }

    fn check_foreign_markers(&self, run: &mut Run<'_>) {
        match self.ledger.owned_keys() {
            Ok(keys) => {
                for key in keys.iter().filter(|k| !self.catalog.contains(k)) {
                    run.warn(format!("marker for {key} has no catalog entry; left in place"));
                }
            }
            Err(e) => run.warn(format!("cannot list markers: {e}")),
        }
    }

    /// Native and vendor entries: one refresh, one install transaction.
    fn install_batch(&self, tracked: &[Tracked<'a>], ctx: &StrategyContext, run: &mut Run<'_>) {
        let mut pending = Vec::new();
        for t in tracked
            .iter()
            .filter(|t| t.desired && t.entry.strategy.is_batchable())
        {
            match ctx.packages.missing(&t.entry.packages) {
                Ok(missing) if missing.is_empty() => {
                    let action = if t.marker.is_some() { Action::Keep } else { Action::Install };
                    run.record(t.outcome(action, EntryStatus::Unchanged));
                }
                Ok(missing) => pending.push(BatchItem { tracked: t, missing }),
                Err(e) => run.record(t.outcome(Action::Install, status_for(&StrategyError::from(e)))),
            }
        }
        if pending.is_empty() {
            return;
        }

        run.phase(Phase::Repositories);
        let mut ready = Vec::new();
        for item in pending {
            let entry = item.tracked.entry;
            let prepared = self
                .registry
                .get(entry.strategy)
                .map_err(failed)
                .and_then(|installer| installer.prepare(entry, ctx).map_err(|e| status_for(&e)));
            match prepared {
                Ok(()) => ready.push(item),
                Err(status) => run.record(item.tracked.outcome(Action::Install, status)),
            }
        }
        if ready.is_empty() {
            return;
        }

        run.phase(Phase::RefreshIndex);
        if let Err(e) = ctx.packages.refresh_index() {
            let err = StrategyError::Prerequisite {
                what: "package index refresh".to_string(),
                message: e.to_string(),
            };
            for item in &ready {
                run.record(item.tracked.outcome(Action::Install, status_for(&err)));
            }
            return;
        }

        let mut union: Vec<String> = Vec::new();
        for package in ready.iter().flat_map(|item| &item.missing) {
            if !union.contains(package) {
                union.push(package.clone());
            }
        }
        let filter = match ctx.packages.filter_installable(&union) {
            Ok(filter) => filter,
            Err(e) => {
                let err = StrategyError::from(e);
                for item in &ready {
                    run.record(item.tracked.outcome(Action::Install, status_for(&err)));
                }
                return;
            }
        };
        let unavailable: BTreeSet<&str> = filter.unavailable.iter().map(String::as_str).collect();

        run.phase(Phase::PackageInstall);
        for item in &ready {
            run.start(&item.tracked.entry.key, Action::Install);
        }
        let install_error = if filter.installable.is_empty() {
            None
        } else {
            ctx.packages.install(&filter.installable).err()
        };

        for item in ready {
            let outcome = self.settle_batch_item(item, &unavailable, install_error.as_ref(), ctx);
            run.record(outcome);
        }
    }

    /// Verify one entry after the transaction and mark it if complete.
    fn settle_batch_item(
        &self,
        item: BatchItem<'_, 'a>,
        unavailable: &BTreeSet<&str>,
        install_error: Option<&aptkit::Error>,
        ctx: &StrategyContext,
    ) -> EntryOutcome {
        let t = item.tracked;
        let skipped: Vec<String> = item
            .missing
            .iter()
            .filter(|p| unavailable.contains(p.as_str()))
            .cloned()
            .collect();
        let warnings = unavailable_warnings(&skipped);

        let still_missing = match ctx.packages.missing(&t.entry.packages) {
            Ok(missing) => missing,
            Err(e) => {
                return t
                    .outcome(Action::Install, status_for(&StrategyError::from(e)))
                    .with_warnings(warnings);
            }
        };

        if still_missing.is_empty() {
            let mut packages: Vec<String> = t
                .marker
                .as_ref()
                .map(|m| m.artifact.packages().to_vec())
                .unwrap_or_default();
            for package in item.missing {
                if !packages.contains(&package) {
                    packages.push(package);
                }
            }
            let status = match self.ledger.mark(
                &t.entry.key,
                t.entry.strategy,
                ArtifactSnapshot::Packages { packages },
            ) {
                Ok(_) => EntryStatus::Installed,
                Err(e) => failed(format!("installed but ownership not recorded: {e}")),
            };
            return t.outcome(Action::Install, status).with_warnings(warnings);
        }

        if let Some(err) = install_error {
            return t
                .outcome(Action::Install, failed(format!("package transaction failed: {err}")))
                .with_warnings(warnings);
        }

        let reason = if still_missing.iter().all(|p| unavailable.contains(p.as_str())) {
            format!("no installable candidate for {}", still_missing.join(", "))
        } else {
            format!("not present after install: {}", still_missing.join(", "))
        };
        let mut warnings = warnings;
        warnings.push(format!("{} left unowned: {reason}", t.entry.key));
        t.outcome(Action::Install, EntryStatus::Skipped { reason })
            .with_warnings(warnings)
    }

    fn install_individual(
        &self,
        tracked: &[Tracked<'a>],
        pins: &VersionPins,
        ctx: &StrategyContext,
        run: &mut Run<'_>,
    ) {
        let items: Vec<&Tracked<'a>> = tracked
            .iter()
            .filter(|t| t.desired && !t.entry.strategy.is_batchable())
            .collect();
        if items.is_empty() {
            return;
        }
        run.phase(Phase::Individual);
        for t in items {
            let action = if t.marker.is_some() { Action::Keep } else { Action::Install };
            run.start(&t.entry.key, action);
            let outcome = self.install_one(t, pins, ctx);
            run.record(outcome);
        }
    }

    fn install_one(&self, t: &Tracked<'_>, pins: &VersionPins, ctx: &StrategyContext) -> EntryOutcome {
        let entry = t.entry;
        let installer = match self.registry.get(entry.strategy) {
            Ok(installer) => installer,
            Err(e) => return t.outcome(Action::Install, failed(e)),
        };

        let report = match &t.marker {
            Some(marker) => match installer.verify(entry, &marker.artifact, pins, ctx) {
                Ok(true) => return t.outcome(Action::Keep, EntryStatus::Unchanged),
                Ok(false) => {
                    log::info!("{}: owned install no longer matches, reinstalling", entry.key);
                    installer.reinstall(entry, &marker.artifact, pins, ctx)
                }
                Err(e) => return t.outcome(Action::Keep, status_for(&e)),
            },
            None => installer.install(entry, pins, ctx),
        };

        match report {
            Ok(InstallReport::Installed { snapshot, warnings }) => {
                let status = match installer.verify(entry, &snapshot, pins, ctx) {
                    Ok(true) => match self.ledger.mark(&entry.key, entry.strategy, snapshot) {
                        Ok(_) => EntryStatus::Installed,
                        Err(e) => failed(format!("installed but ownership not recorded: {e}")),
                    },
                    Ok(false) => EntryStatus::Skipped {
                        reason: "install did not verify; left unowned".to_string(),
                    },
                    Err(e) => status_for(&e),
                };
                t.outcome(Action::Install, status).with_warnings(warnings)
            }
            Ok(InstallReport::AlreadyPresent { detail }) => {
                log::info!("{}: {detail}", entry.key);
                let action = if t.marker.is_some() { Action::Keep } else { Action::Install };
                t.outcome(action, EntryStatus::Unchanged)
            }
            Ok(InstallReport::Deferred { reason }) => {
                t.outcome(Action::Install, EntryStatus::Skipped { reason })
            }
            Err(e) => t.outcome(Action::Install, status_for(&e)),
        }
    }

    fn remove_individual(&self, tracked: &[Tracked<'a>], ctx: &StrategyContext, run: &mut Run<'_>) {
        let items: Vec<(&Tracked<'a>, &Marker)> = tracked
            .iter()
            .filter(|t| !t.desired && !t.entry.strategy.is_batchable())
            .filter_map(|t| t.marker.as_ref().map(|m| (t, m)))
            .collect();
        if items.is_empty() {
            return;
        }
        run.phase(Phase::Removal);
        for (t, marker) in items {
            run.start(&t.entry.key, Action::Remove);
            let outcome = self.remove_one(t, &marker.artifact, marker, ctx);
            run.record(outcome);
        }
    }

    /// Owned package entries, minus packages another selected entry still needs.
    fn remove_batch(&self, tracked: &[Tracked<'a>], ctx: &StrategyContext, run: &mut Run<'_>) {
        let items: Vec<(&Tracked<'a>, &Marker)> = tracked
            .iter()
            .filter(|t| !t.desired && t.entry.strategy.is_batchable())
            .filter_map(|t| t.marker.as_ref().map(|m| (t, m)))
            .collect();
        if items.is_empty() {
            return;
        }

        let needed: BTreeSet<&str> = tracked
            .iter()
            .filter(|t| t.desired)
            .flat_map(|t| {
                t.entry
                    .packages
                    .iter()
                    .chain(t.marker.iter().flat_map(|m| m.artifact.packages()))
            })
            .map(String::as_str)
            .collect();

        run.phase(Phase::Removal);
        for (t, marker) in items {
            run.start(&t.entry.key, Action::Remove);
            let (kept, dropped): (Vec<String>, Vec<String>) = marker
                .artifact
                .packages()
                .iter()
                .cloned()
                .partition(|p| needed.contains(p.as_str()));
            let warnings: Vec<String> = kept
                .iter()
                .map(|p| format!("kept {p}: still required by another selected entry"))
                .collect();
            let snapshot = ArtifactSnapshot::Packages { packages: dropped };
            let outcome = self
                .remove_one(t, &snapshot, marker, ctx)
                .with_warnings(warnings);
            run.record(outcome);
        }
    }

    /// Remove with the strategy recorded in the marker, then unmark.
    fn remove_one(
        &self,
        t: &Tracked<'_>,
        snapshot: &ArtifactSnapshot,
        marker: &Marker,
        ctx: &StrategyContext,
    ) -> EntryOutcome {
        let installer = match self.registry.get(marker.strategy) {
            Ok(installer) => installer,
            Err(e) => return t.outcome(Action::Remove, failed(e)),
        };
        let status = match installer.remove(t.entry, snapshot, ctx) {
            Ok(()) => match self.ledger.unmark(&t.entry.key) {
                Ok(_) => EntryStatus::Removed,
                Err(e) => failed(format!("removed but marker not cleared: {e}")),
            },
            Err(e) => status_for(&e),
        };
        t.outcome(Action::Remove, status)
    }
}
