use colored::{ColoredString, Colorize};
use provision::{AuditStatus, EntryStatus};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Checkbox for a selection flag.
pub fn checkbox(on: bool) -> ColoredString {
    if on { "[x]".green() } else { "[ ]".dimmed() }
}

pub fn entry_status(status: &EntryStatus) -> ColoredString {
    let label = status.label();
    match status {
        EntryStatus::Installed | EntryStatus::Removed => label.green(),
        EntryStatus::Unchanged => label.dimmed(),
        EntryStatus::Skipped { .. } => label.yellow(),
        EntryStatus::Failed { .. } => label.red().bold(),
    }
}

pub fn audit_status(status: AuditStatus) -> ColoredString {
    let label = status.to_string();
    match status {
        AuditStatus::Ok => label.green(),
        AuditStatus::Missing => label.red().bold(),
        AuditStatus::Unknown => label.yellow(),
    }
}
