use anyhow::Result;
use colored::Colorize;
use std::env;
use std::path::Path;

use super::Session;
use crate::Context;
use crate::sudo::{self, SudoContext};
use crate::ui;

struct Issue {
    category: &'static str,
    summary: String,
    detail: Option<String>,
    fix: Option<String>,
    fix_cmd: Option<String>,
}

impl Issue {
    fn new(category: &'static str, summary: impl Into<String>) -> Self {
        Self {
            category,
            summary: summary.into(),
            detail: None,
            fix: None,
            fix_cmd: None,
        }
    }

    fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    fn fix(mut self, fix: impl Into<String>) -> Self {
        self.fix = Some(fix.into());
        self
    }

    fn fix_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.fix_cmd = Some(cmd.into());
        self
    }
}

fn ok(label: &str, value: &str) {
    println!("  {} {} {}", "✓".green(), label, value.dimmed());
}

fn bad(label: &str, value: &str) {
    println!("  {} {} {}", "✗".red(), label, value.red());
}

pub fn run(_ctx: &Context) -> Result<()> {
    ui::header("System Health Check");

    let session = Session::open(None)?;
    let mut issues: Vec<Issue> = Vec::new();

    check_platform(&session, &mut issues);
    check_paths(&session, &mut issues);
    check_package_manager(&session, &mut issues);
    check_privileges(&mut issues);
    check_user(&session, &mut issues);
    check_ownership(&session, &mut issues);

    println!();
    if issues.is_empty() {
        ui::success("All checks passed!");
    } else {
        print_issue_summary(&issues);
    }
    Ok(())
}

fn print_issue_summary(issues: &[Issue]) {
    let count = issues.len();
    let label = if count == 1 { "Issue" } else { "Issues" };
    ui::header(&format!("{count} {label} Found"));

    for (i, issue) in issues.iter().enumerate() {
        println!(
            "  {}  {} {}",
            format!("{}.", i + 1).bold(),
            issue.summary,
            format!("[{}]", issue.category).dimmed()
        );
        if let Some(detail) = &issue.detail {
            for line in detail.lines() {
                println!("      {}", line.dimmed());
            }
        }
        if let Some(fix) = &issue.fix {
            println!("      {} {}", "Fix:".cyan(), fix);
        }
        if let Some(cmd) = &issue.fix_cmd {
            println!("      {} {}", "$".dimmed(), cmd.bold());
        }
        println!();
    }
}

fn check_platform(session: &Session, issues: &mut Vec<Issue>) {
    ui::section("Platform");
    let ctx = session.engine.context();

    match toolchain::platform::detect() {
        Ok(platform) => ok("release artifacts:", &format!("{}/{}", platform.os, platform.arch)),
        Err(e) => {
            bad("release artifacts:", &e.to_string());
            issues.push(
                Issue::new("Platform", "Standalone binaries cannot be installed here")
                    .detail(e.to_string()),
            );
        }
    }

    match ctx.codename() {
        Some(codename) => ok("release codename:", &codename),
        None => {
            bad("release codename:", "unknown");
            issues.push(
                Issue::new("Platform", "No VERSION_CODENAME in os-release")
                    .detail(format!("read {}", ctx.paths.os_release.display()))
                    .fix("Vendor repositories need the release codename; use a Debian or Ubuntu host"),
            );
        }
    }
}

fn check_paths(session: &Session, issues: &mut Vec<Issue>) {
    ui::section("Paths");
    ok("config:", &session.config_path.display().to_string());

    let state = &session.state_dir;
    if state.is_dir() || !state.exists() {
        ok("state:", &state.display().to_string());
    } else {
        bad("state:", &format!("{} is not a directory", state.display()));
        issues.push(
            Issue::new("Paths", "State path exists but is not a directory")
                .detail(state.display().to_string())
                .fix("Remove it or point [paths] state_dir elsewhere"),
        );
    }

    let bin_dir = &session.engine.context().paths.bin_dir;
    if on_path(bin_dir) {
        ok("bin dir:", &bin_dir.display().to_string());
    } else {
        bad("bin dir:", &format!("{} not on PATH", bin_dir.display()));
        issues.push(
            Issue::new("Paths", "Standalone binaries will not be found on PATH")
                .detail(bin_dir.display().to_string())
                .fix(format!("Add {} to PATH", bin_dir.display())),
        );
    }
}

fn on_path(dir: &Path) -> bool {
    env::var_os("PATH").is_some_and(|path| env::split_paths(&path).any(|p| p == dir))
}

fn check_package_manager(session: &Session, issues: &mut Vec<Issue>) {
    ui::section("Package Manager");
    if session.engine.context().packages.is_available() {
        ok("apt-get:", "available");
    } else {
        bad("apt-get:", "not found");
        issues.push(
            Issue::new("Package Manager", "apt-get is not available")
                .detail("plan, apply and audit need a Debian-based host"),
        );
    }
}

fn check_privileges(issues: &mut Vec<Issue>) {
    ui::section("Privileges");
    if sudo::is_root() {
        ok("running as:", "root");
        return;
    }
    if !sudo::sudo_available() {
        bad("sudo:", "not installed");
        issues.push(
            Issue::new("Privileges", "Not root and sudo is missing")
                .fix("Run hostkit apply as root, or install sudo")
                .fix_cmd("su -c 'apt-get install -y sudo'"),
        );
        return;
    }
    let cached = if SudoContext::is_valid() { "credentials cached" } else { "will prompt" };
    ok("sudo:", cached);
}

fn check_user(session: &Session, issues: &mut Vec<Issue>) {
    ui::section("Target User");
    match &session.engine.context().user {
        Some(user) if user.home.is_dir() => {
            ok(&format!("{}:", user.name), &user.home.display().to_string());
        }
        Some(user) => {
            bad(&format!("{}:", user.name), "home directory missing");
            issues.push(
                Issue::new("Target User", format!("No home directory for {}", user.name))
                    .detail(user.home.display().to_string()),
            );
        }
        None => {
            bad("user:", "none");
            issues.push(
                Issue::new("Target User", "No non-root target user")
                    .detail("Per-user runtimes (nvm, pyenv) need an account to install into")
                    .fix("Set [user] name in config.toml or run through sudo"),
            );
        }
    }
}

fn check_ownership(session: &Session, issues: &mut Vec<Issue>) {
    ui::section("Ownership Records");
    match session.engine.ownership() {
        Ok(markers) => ok("markers:", &format!("{} readable", markers.len())),
        Err(e) => {
            bad("markers:", "unreadable");
            issues.push(
                Issue::new("Ownership Records", "A marker file could not be read")
                    .detail(e.to_string())
                    .fix("Inspect the file; hostkit will not remove entries it cannot read"),
            );
        }
    }
}
