//! `select`, `defaults` and `status`

use anyhow::Result;
use chrono::Local;
use colored::Colorize;
use provision::{CatalogKey, SelectionState};

use super::Session;
use crate::Context;
use crate::cli::SelectArgs;
use crate::ui;

pub fn select(ctx: &Context, args: SelectArgs) -> Result<()> {
    let session = Session::open(None)?;
    let engine = &session.engine;

    let state = if let Some(only) = args.only {
        let keys: Vec<CatalogKey> = only.iter().map(|k| CatalogKey::new(k.trim())).collect();
        let state = engine.set_selection_bulk(&keys)?;
        if !ctx.quiet {
            ui::success(&format!("Selection is now exactly {} entries", keys.len()));
        }
        state
    } else {
        let on = !args.off;
        let mut state = engine.selection()?;
        for key in &args.keys {
            state = engine.set_selection(&CatalogKey::new(key.as_str()), on)?;
        }
        if !ctx.quiet {
            let verb = if on { "Selected" } else { "Deselected" };
            ui::success(&format!("{verb} {}", args.keys.join(", ")));
        }
        state
    };

    if !ctx.quiet {
        print_selected(&state);
        ui::dim("Run `hostkit plan` to preview or `hostkit apply` to converge.");
    }
    Ok(())
}

pub fn defaults(ctx: &Context) -> Result<()> {
    let session = Session::open(None)?;
    let state = session.engine.apply_defaults_replace()?;
    if !ctx.quiet {
        ui::success("Selection and pins reset to catalog defaults");
        print_selected(&state);
    }
    Ok(())
}

pub fn status(_ctx: &Context) -> Result<()> {
    let session = Session::open(None)?;
    let engine = &session.engine;
    let state = engine.selection()?;
    let markers = engine.ownership()?;

    ui::header("hostkit status");
    ui::kv("Config", &session.config_path.display().to_string());
    ui::kv("Selection", &engine.store().path().display().to_string());
    match &engine.context().user {
        Some(user) => ui::kv("Target user", &format!("{} ({})", user.name, user.home.display())),
        None => ui::kv("Target user", &"none".dimmed().to_string()),
    }
    let apply = &session.config.apply;
    ui::kv(
        "On apply",
        &format!(
            "autoremove {}, repository removal {}",
            if apply.autoremove { "on" } else { "off" },
            if apply.remove_repositories { "on" } else { "off" }
        ),
    );

    print_selected(&state);

    ui::section("Pins");
    for (pin, value) in state.pins.iter() {
        let shown = if value == pin.default_value() {
            value.dimmed().to_string()
        } else {
            value.bold().to_string()
        };
        println!("  {:<18} {shown}", pin.name());
    }

    ui::section(&format!("Owned ({})", markers.len()));
    if markers.is_empty() {
        ui::dim("Nothing installed by hostkit yet");
    }
    for marker in &markers {
        let pending = if state.get(&marker.key) {
            String::new()
        } else {
            format!("  {}", "removed on next apply".yellow())
        };
        println!(
            "  {:<18} {:<26} {}{pending}",
            marker.key.as_str(),
            marker.strategy.as_str().dimmed(),
            marker
                .installed_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

fn print_selected(state: &SelectionState) {
    let keys = state.selected_keys();
    ui::section(&format!("Selected ({})", keys.len()));
    if keys.is_empty() {
        ui::dim("Nothing selected");
        return;
    }
    let names: Vec<&str> = keys.iter().map(CatalogKey::as_str).collect();
    println!("  {}", names.join(" "));
}
