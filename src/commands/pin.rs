use anyhow::Result;
use colored::Colorize;

use super::Session;
use crate::Context;
use crate::cli::PinCommand;
use crate::ui;

pub fn run(ctx: &Context, cmd: PinCommand) -> Result<()> {
    match cmd {
        PinCommand::List => list(),
        PinCommand::Set { pin, value } => set(ctx, &pin, &value),
    }
}

fn list() -> Result<()> {
    let session = Session::open(None)?;
    let state = session.engine.selection()?;

    ui::header("Version pins");
    for (pin, value) in state.pins.iter() {
        println!(
            "  {:<18} {:<14} {}",
            pin.name(),
            value.bold(),
            format!("{} (default {})", pin.help(), pin.default_value()).dimmed()
        );
    }
    Ok(())
}

fn set(ctx: &Context, pin: &str, value: &str) -> Result<()> {
    let session = Session::open(None)?;
    let state = session.engine.edit_version_pin(pin, value)?;
    if !ctx.quiet {
        let pin: provision::Pin = pin.parse()?;
        ui::success(&format!("{} = {}", pin.name(), state.pins.get(pin)));
    }
    Ok(())
}
