//! `ngxctl validate`: dry-run a configuration with `-t`.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use ngxctl_core::ConfigId;
use ngxctl_supervisor::Settings;

use super::{open_supervisor, print_json, runtime};

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Configuration file name inside the config directory.
    pub config: String,

    /// Emit the validation report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl ValidateArgs {
    pub fn run(self, settings: Settings) -> Result<()> {
        let config = ConfigId::from(self.config);
        let rt = runtime()?;
        let supervisor = open_supervisor(settings)?;
        let report = rt
            .block_on(supervisor.validate(Some(&config)))
            .with_context(|| format!("failed to validate '{config}'"))?;

        if self.json {
            print_json(&report)?;
        } else {
            print!("{}", report.diagnostics);
            if !report.diagnostics.is_empty() && !report.diagnostics.ends_with('\n') {
                println!();
            }
        }
        if !report.success {
            bail!("configuration test failed for '{config}'");
        }
        if !self.json {
            println!("{} {config}", "valid".green().bold());
        }
        Ok(())
    }
}
