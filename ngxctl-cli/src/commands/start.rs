//! `ngxctl start`: launch an instance and register its processes.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use ngxctl_core::ConfigId;
use ngxctl_supervisor::Settings;

use super::{open_supervisor, print_json, runtime};

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Configuration file name inside the config directory.
    pub config: String,

    /// Emit the launch result as JSON.
    #[arg(long)]
    pub json: bool,
}

impl StartArgs {
    pub fn run(self, settings: Settings) -> Result<()> {
        let config = ConfigId::from(self.config);
        let rt = runtime()?;
        let supervisor = open_supervisor(settings)?;
        let result = rt
            .block_on(supervisor.launch(Some(&config)))
            .with_context(|| format!("failed to start '{config}'"))?;

        if self.json {
            return print_json(&result);
        }
        println!(
            "{} {} on port {} (master {}, {} workers)",
            "started".green().bold(),
            result.config,
            result.listen_port,
            result.primary,
            result.secondaries.len(),
        );
        println!("{} {}", "stderr".dimmed(), result.stderr_log.display());
        Ok(())
    }
}
