pub mod apply;
pub mod audit;
pub mod catalog;
pub mod doctor;
pub mod pin;
pub mod profile;
pub mod selection;

use anyhow::{Context, Result, bail};
use provision::{Engine, ProcessSystem, StateLayout, StrategyContext};
use std::path::PathBuf;
use toolchain::HttpBackend;

use crate::config::HostkitConfig;

/// Resolved config plus an engine wired to the real host.
pub struct Session {
    pub config: HostkitConfig,
    pub config_path: PathBuf,
    pub state_dir: PathBuf,
    pub engine: Engine,
}

impl Session {
    /// `user` overrides the configured target account.
    pub fn open(user: Option<&str>) -> Result<Self> {
        let (config, config_path) = HostkitConfig::load_default()?;
        let state_dir = config.state_dir()?;
        log::debug!("State dir: {}", state_dir.display());

        let releases = toolchain::Client::with_backend(Box::new(
            HttpBackend::new().with_github_token(config.github_token()),
        ));
        let ctx = StrategyContext {
            packages: aptkit::backend::detect(),
            releases,
            system: Box::new(ProcessSystem),
            paths: config.host_paths(),
            state: StateLayout::new(&state_dir),
            user: config.target_user(user),
            options: config.apply_options(),
            platform: None,
        };
        let engine = Engine::builtin(ctx, config.backups.retention)
            .context("Built-in catalog failed validation")?;

        Ok(Self {
            config,
            config_path,
            state_dir,
            engine,
        })
    }

    /// Refuse host-touching work where apt is missing.
    pub fn require_apt(&self) -> Result<()> {
        if !self.engine.context().packages.is_available() {
            bail!("apt-get not found; hostkit can only plan, apply and audit on Debian-based hosts");
        }
        Ok(())
    }
}
