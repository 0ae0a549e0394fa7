//! `ngxctl configs`: list managed configuration files.

use anyhow::{Context, Result};
use clap::Args;

use ngxctl_core::config::list_configs;
use ngxctl_supervisor::Settings;

use super::print_json;

#[derive(Args, Debug)]
pub struct ConfigsArgs {
    /// Emit the list as a JSON array.
    #[arg(long)]
    pub json: bool,
}

impl ConfigsArgs {
    pub fn run(self, settings: Settings) -> Result<()> {
        let configs = list_configs(&settings.config_dir, &settings.config_prefix).with_context(|| {
            format!("failed to read config directory {}", settings.config_dir.display())
        })?;

        if self.json {
            return print_json(&configs);
        }
        if configs.is_empty() {
            println!(
                "No configurations matching {}*.conf in {}",
                settings.config_prefix,
                settings.config_dir.display()
            );
            return Ok(());
        }
        for config in configs {
            println!("{config}");
        }
        Ok(())
    }
}
