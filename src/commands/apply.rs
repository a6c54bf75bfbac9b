//! `plan` and `apply`

use anyhow::{Result, bail};
use colored::Colorize;
use provision::{AuditStatus, CatalogKey, EntryStatus, Plan, ReconcileReport};
use std::ffi::OsString;

use super::Session;
use crate::Context;
use crate::cli::ApplyArgs;
use crate::paths;
use crate::progress::ApplyProgress;
use crate::sudo::{self, SudoContext};
use crate::ui;

pub fn plan(_ctx: &Context) -> Result<()> {
    let session = Session::open(None)?;
    session.require_apt()?;
    let plan = session.engine.plan()?;
    ui::header("Plan");
    print_plan(&plan);
    Ok(())
}

pub fn apply(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let session = Session::open(args.user.as_deref())?;
    session.require_apt()?;

    let plan = session.engine.plan()?;
    if !ctx.quiet {
        ui::header("Plan");
        print_plan(&plan);
    }

    if !args.yes && !plan.is_empty() && !confirm_proceed()? {
        ui::info("Aborted");
        return Ok(());
    }

    if sudo::is_root() {
        return converge(ctx, &session);
    }

    if !sudo::sudo_available() {
        bail!("apply needs root; run it as root or install sudo");
    }
    let context = SudoContext::acquire("installing and removing system software")?;
    let status = context.reexec(
        &paths::config_dir()?,
        &session.state_dir,
        &child_args(ctx, &session),
    )?;
    drop(context);

    if !status.success() {
        bail!(
            "apply did not complete (exit status {})",
            status.code().map_or_else(|| "unknown".to_string(), |c| c.to_string())
        );
    }
    Ok(())
}

/// Arguments for the privileged re-run; the operator already confirmed.
fn child_args(ctx: &Context, session: &Session) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["apply".into(), "--yes".into()];
    if let Some(user) = &session.engine.context().user {
        args.push("--user".into());
        args.push(user.name.clone().into());
    }
    if ctx.quiet {
        args.push("--quiet".into());
    }
    for _ in 0..ctx.verbose {
        args.push("--verbose".into());
    }
    args
}

fn confirm_proceed() -> Result<bool> {
    let proceed = dialoguer::Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;
    Ok(proceed)
}

fn converge(ctx: &Context, session: &Session) -> Result<()> {
    if !ctx.quiet {
        ui::header("Applying");
    }
    let mut progress = ApplyProgress::new(ctx.quiet);
    let report = session.engine.reconcile(&mut progress)?;
    progress.finish();

    print_report(&report);

    if !report.is_success() {
        bail!(
            "apply finished with {} failed entries, audit {}",
            report.summary.failed,
            if report.audit.passed { "passed" } else { "failed" }
        );
    }
    Ok(())
}

fn key_list(keys: &[CatalogKey]) -> String {
    keys.iter()
        .map(CatalogKey::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}

fn print_plan(plan: &Plan) {
    if plan.is_empty() {
        ui::success("Nothing to install or remove");
    }
    if !plan.install.is_empty() {
        ui::section(&format!("Install ({})", plan.install.len()));
        println!("  {}", key_list(&plan.install).green());
    }
    if !plan.remove.is_empty() {
        ui::section(&format!("Remove ({})", plan.remove.len()));
        println!("  {}", key_list(&plan.remove).red());
    }
    if !plan.not_owned.is_empty() {
        ui::section(&format!("Deselected but not owned ({})", plan.not_owned.len()));
        println!("  {}", key_list(&plan.not_owned).yellow());
        ui::dim("Installed outside hostkit; left in place.");
    }
    if !plan.unchanged.is_empty() {
        println!();
        ui::dim(&format!("{} selected entries already in place", plan.unchanged.len()));
    }
}

fn print_report(report: &ReconcileReport) {
    let noteworthy: Vec<_> = report
        .outcomes
        .iter()
        .filter(|o| !matches!(o.status, EntryStatus::Unchanged) || !o.warnings.is_empty())
        .collect();

    if !noteworthy.is_empty() {
        ui::section("Changes");
        for outcome in noteworthy {
            let detail = match &outcome.status {
                EntryStatus::Skipped { reason } => format!(" {}", reason.dimmed()),
                EntryStatus::Failed { error } => format!(" {}", error.red()),
                _ => String::new(),
            };
            println!(
                "  {:<10} {}{detail}",
                ui::entry_status(&outcome.status),
                outcome.key
            );
            for warning in &outcome.warnings {
                println!("             {} {}", "⚠".yellow(), warning);
            }
        }
    }

    if !report.warnings.is_empty() {
        ui::section("Warnings");
        for warning in &report.warnings {
            ui::warn(warning);
        }
    }

    let missing: Vec<_> = report
        .audit
        .rows
        .iter()
        .filter(|row| row.status != AuditStatus::Ok)
        .collect();
    if !missing.is_empty() {
        ui::section("Audit");
        for row in missing {
            println!(
                "  {:<8} {:<18} {}",
                ui::audit_status(row.status),
                row.key.as_str(),
                row.details.dimmed()
            );
        }
    }

    let s = &report.summary;
    println!();
    let line = format!(
        "{} installed, {} removed, {} unchanged, {} skipped, {} failed",
        s.installed, s.removed, s.unchanged, s.skipped, s.failed
    );
    if report.is_success() {
        ui::success(&line);
    } else {
        ui::error(&line);
    }
}
