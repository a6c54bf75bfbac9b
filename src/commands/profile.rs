use anyhow::Result;
use colored::Colorize;
use provision::{CatalogKey, MergeMode};

use super::Session;
use crate::Context;
use crate::cli::ProfileCommand;
use crate::ui;

pub fn run(ctx: &Context, cmd: ProfileCommand) -> Result<()> {
    match cmd {
        ProfileCommand::List => list(),
        ProfileCommand::Show { name } => show(&name),
        ProfileCommand::Apply { name, add } => {
            let mode = if add { MergeMode::Add } else { MergeMode::Replace };
            apply(ctx, &name, mode)
        }
    }
}

fn list() -> Result<()> {
    let session = Session::open(None)?;
    ui::header("Profiles");
    for profile in session.engine.profiles().iter() {
        println!(
            "  {:<16} {} {}",
            profile.name.bold(),
            profile.description,
            format!("({} entries)", profile.keys.len()).dimmed()
        );
    }
    Ok(())
}

fn show(name: &str) -> Result<()> {
    let session = Session::open(None)?;
    let engine = &session.engine;
    let profile = engine.profiles().get(name)?;

    ui::header(&format!("Profile: {}", profile.name));
    ui::dim(&profile.description);

    ui::section("Entries");
    for key in &profile.keys {
        let label = engine.catalog().entry(key).map_or("", |e| e.label.as_str());
        println!("  {:<18} {}", key.as_str(), label.dimmed());
    }

    if !profile.pin_overrides.is_empty() {
        ui::section("Pins");
        for (pin, value) in &profile.pin_overrides {
            ui::kv(pin.name(), value);
        }
    }
    Ok(())
}

fn apply(ctx: &Context, name: &str, mode: MergeMode) -> Result<()> {
    let session = Session::open(None)?;
    let resolution = session.engine.apply_profile(name, mode)?;

    for warning in &resolution.warnings {
        ui::warn(warning);
    }
    if !ctx.quiet {
        let keys = resolution.state.selected_keys();
        ui::success(&format!("Applied profile '{name}' ({mode})"));
        let names: Vec<&str> = keys.iter().map(CatalogKey::as_str).collect();
        ui::kv("Selected", &names.join(" "));
        ui::dim("Run `hostkit plan` to preview the changes.");
    }
    Ok(())
}
