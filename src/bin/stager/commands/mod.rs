//! Command implementations

pub mod build;
pub mod completions;
pub mod configs;
pub mod flags;

use std::path::PathBuf;

use anyhow::{Context, Result};

use stager::builder::BuildContext;
use stager::util::{Config, Paths};

/// Options shared by every subcommand.
pub struct GlobalArgs {
    pub root: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

impl GlobalArgs {
    /// Load `stager.toml` and resolve the filesystem layout.
    pub fn load(&self) -> Result<(Config, Paths)> {
        let root = match &self.root {
            Some(root) => root.clone(),
            None => std::env::current_dir().context("failed to determine current directory")?,
        };

        let config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::load_or_default(&root.join("stager.toml"))?,
        };

        let paths = Paths::new(root, &config.paths)
            .with_env_overrides()
            .with_host_tools();
        Ok((config, paths))
    }

    /// A build context running commands on this system.
    pub fn context(&self, jobs: Option<usize>) -> Result<BuildContext> {
        let (mut config, paths) = self.load()?;
        // CLI > config > CPU count
        if jobs.is_some() {
            config.build.jobs = jobs;
        }
        Ok(BuildContext::new(paths, &config))
    }
}
