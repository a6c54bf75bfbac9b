use anyhow::Result;
use colored::Colorize;
use provision::{CatalogKey, Row};
use std::collections::BTreeSet;

use super::Session;
use crate::Context;
use crate::ui;

pub fn run(_ctx: &Context) -> Result<()> {
    let session = Session::open(None)?;
    let engine = &session.engine;
    let selection = engine.selection()?;
    let owned: BTreeSet<CatalogKey> = engine.ownership()?.into_iter().map(|m| m.key).collect();

    ui::header("Catalog");
    for row in engine.catalog().rows() {
        match row {
            Row::Heading(title) => ui::section(title),
            Row::Spacer => println!(),
            Row::Entry(entry) => {
                let owned_tag = if owned.contains(&entry.key) {
                    " owned".blue().to_string()
                } else {
                    String::new()
                };
                println!(
                    "  {} {:<18} {}{}",
                    ui::checkbox(selection.get(&entry.key)),
                    entry.key.as_str(),
                    entry.label,
                    owned_tag
                );
                if !entry.description.is_empty() {
                    println!("        {}", entry.description.dimmed());
                }
            }
        }
    }

    println!();
    ui::dim(&format!(
        "{} selected, {} owned. Change with `hostkit select <key>`.",
        selection.selected_keys().len(),
        owned.len()
    ));
    Ok(())
}
