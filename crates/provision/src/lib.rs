//! # provision
//!
//! Declarative selection and reconciliation for a single host.
//!
//! An operator records which catalog entries they want (the selection) and
//! the engine converges the host toward it, keeping a marker for everything it
//! installed itself. Deselecting an entry removes it only when such a marker
//! exists, so packages that were on the host before the engine never go away.
//!
//! ## Core Concepts
//!
//! - **Catalog**: compiled-in entries, each naming an install strategy
//! - **Selection**: desired keys plus version pins, persisted as `selection.env`
//! - **Marker ledger**: one JSON ownership record per installed key
//! - **Strategies**: native packages, vendor repositories, release binaries,
//!   vendor scripts, per-user runtime managers, Python target selection
//! - **Reconciler**: batched installs, individual installs, conservative removals
//! - **Audit**: read-only check of the live host against the selection
//!
//! ## Example
//!
//! ```ignore
//! use provision::{Engine, NoProgress};
//!
//! let engine = Engine::builtin(ctx, provision::engine::DEFAULT_BACKUP_RETENTION)?;
//! engine.set_selection(&"jq".into(), true)?;
//! let report = engine.reconcile(&mut NoProgress)?;
//! println!("{} changes, audit passed: {}", report.summary.total_changes(), report.audit.passed);
//! ```

#![warn(clippy::all)]

pub mod audit;
pub mod catalog;
pub mod context;
pub mod engine;
pub mod error;
pub mod host;
pub mod ledger;
pub mod pins;
pub mod profile;
pub mod reconcile;
pub mod selection;
pub mod strategy;
pub mod types;

pub use audit::{AuditReport, AuditRow};
pub use catalog::{Catalog, CatalogEntry, Row};
pub use context::{
    ApplyOptions, HostPaths, NoProgress, Phase, ProgressCallback, StateLayout, StrategyContext,
    TargetUser,
};
pub use engine::Engine;
pub use error::{Error, Result, Severity, StrategyError};
pub use host::{CommandSpec, ProcessSystem, System};
pub use ledger::{ArtifactSnapshot, Marker, MarkerLedger};
pub use pins::{Pin, VersionPins};
pub use profile::{MergeMode, Profile, ProfileSet};
pub use reconcile::{Plan, ReconcileReport, Reconciler};
pub use selection::{SelectionState, SelectionStore};
pub use strategy::{AuditStatus, StrategyRegistry};
pub use types::{Action, CatalogKey, EntryOutcome, EntryStatus, RunSummary, StrategyTag};
