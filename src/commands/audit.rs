use anyhow::{Context as _, Result, bail};
use colored::Colorize;
use provision::AuditStatus;

use super::Session;
use crate::Context;
use crate::ui;

pub fn run(_ctx: &Context, json: bool) -> Result<()> {
    let session = Session::open(None)?;
    session.require_apt()?;
    let report = session.engine.audit()?;

    if json {
        let out = serde_json::to_string_pretty(&report).context("Failed to serialize audit")?;
        println!("{out}");
    } else {
        ui::header("Audit");
        for row in &report.rows {
            println!(
                "  {:<8} {:<18} {:<26} {}",
                ui::audit_status(row.status),
                row.key.as_str(),
                row.strategy.as_str().dimmed(),
                row.details
            );
        }
        println!();
        let counts = format!(
            "{} ok, {} missing, {} unknown",
            report.count(AuditStatus::Ok),
            report.count(AuditStatus::Missing),
            report.count(AuditStatus::Unknown)
        );
        if report.passed {
            ui::success(&counts);
        } else {
            ui::error(&counts);
        }
    }

    if !report.passed {
        bail!("audit failed");
    }
    Ok(())
}
