//! Read-only verification of the live host against the selection
//!
//! The audit deliberately takes no [`MarkerLedger`](crate::ledger::MarkerLedger):
//! ownership records say what the engine did, not what the host looks like now.

use serde::Serialize;

use crate::catalog::Catalog;
use crate::context::StrategyContext;
use crate::error::Result;
use crate::selection::SelectionState;
use crate::strategy::{AuditStatus, StrategyRegistry};
use crate::types::{CatalogKey, StrategyTag};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRow {
    pub key: CatalogKey,
    pub strategy: StrategyTag,
    pub status: AuditStatus,
    pub details: String,
}

/// Audit table plus the pass/fail verdict.
///
/// `UNKNOWN` rows are reported but do not fail the audit; only `MISSING` does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub rows: Vec<AuditRow>,
    pub passed: bool,
}

impl AuditReport {
    pub fn from_rows(rows: Vec<AuditRow>) -> Self {
        let passed = rows.iter().all(|row| row.status != AuditStatus::Missing);
        Self { rows, passed }
    }

    pub fn count(&self, status: AuditStatus) -> usize {
        self.rows.iter().filter(|row| row.status == status).count()
    }

    pub fn row(&self, key: &CatalogKey) -> Option<&AuditRow> {
        self.rows.iter().find(|row| &row.key == key)
    }
}

/// Check every selected key, in catalog order.
pub fn audit(
    catalog: &Catalog,
    registry: &StrategyRegistry,
    selection: &SelectionState,
    ctx: &StrategyContext,
) -> Result<AuditReport> {
    let mut rows = Vec::new();
    for entry in catalog.entries().filter(|e| selection.get(&e.key)) {
        let finding = registry.get(entry.strategy)?.audit(entry, &selection.pins, ctx);
        log::debug!("audit {}: {} {}", entry.key, finding.status, finding.details);
        rows.push(AuditRow {
            key: entry.key.clone(),
            strategy: entry.strategy,
            status: finding.status,
            details: finding.details,
        });
    }
    Ok(AuditReport::from_rows(rows))
}
