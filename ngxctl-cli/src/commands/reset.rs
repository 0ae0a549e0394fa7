//! `ngxctl reset`: recover from an unreadable registry.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use ngxctl_core::RegistryStore;
use ngxctl_supervisor::Settings;

#[derive(Args, Debug)]
pub struct ResetArgs {}

impl ResetArgs {
    /// Overwrite the registry with `{}`. Running processes are left alone and
    /// become untracked.
    pub fn run(self, settings: Settings) -> Result<()> {
        let path = settings.registry_path;
        RegistryStore::empty(&path)
            .flush()
            .with_context(|| format!("failed to reset registry {}", path.display()))?;
        println!("{} {}", "reset".yellow().bold(), path.display());
        Ok(())
    }
}
