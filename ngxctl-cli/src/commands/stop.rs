//! `ngxctl stop`: SIGTERM tracked processes and forget them.

use anyhow::{Context, Result};
use clap::{ArgGroup, Args};
use colored::Colorize;

use ngxctl_core::ConfigId;
use ngxctl_supervisor::{Settings, StopResult};

use super::{open_supervisor, print_json, runtime};

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["config", "all"])))]
pub struct StopArgs {
    /// Configuration whose processes should be stopped.
    pub config: Option<String>,

    /// Stop every tracked process and reset the registry.
    #[arg(long)]
    pub all: bool,

    /// Emit the stop result as JSON.
    #[arg(long)]
    pub json: bool,
}

impl StopArgs {
    pub fn run(self, settings: Settings) -> Result<()> {
        let rt = runtime()?;
        let supervisor = open_supervisor(settings)?;
        let (label, result) = match self.config {
            Some(config) => {
                let config = ConfigId::from(config);
                let result = rt
                    .block_on(supervisor.stop_by_config(&config))
                    .with_context(|| format!("failed to stop '{config}'"))?;
                (config.to_string(), result)
            }
            None => {
                let result = rt
                    .block_on(supervisor.stop_all())
                    .context("failed to stop tracked processes")?;
                ("all instances".to_string(), result)
            }
        };

        if self.json {
            return print_json(&result);
        }
        print_summary(&label, &result);
        Ok(())
    }
}

fn print_summary(label: &str, result: &StopResult) {
    if result.had_no_matches {
        println!("{} nothing tracked for {label}", "idle".bright_black().bold());
        return;
    }
    if result.stopped.is_empty() && result.failed.is_empty() {
        println!("{} no running processes for {label}", "stopped".green().bold());
    } else if !result.stopped.is_empty() {
        let pids: Vec<String> = result.stopped.iter().map(ToString::to_string).collect();
        println!("{} {label} (pids {})", "stopped".green().bold(), pids.join(", "));
    }
    for failure in &result.failed {
        println!(
            "{} could not signal pid {}: {}",
            "warning".yellow().bold(),
            failure.pid,
            failure.error
        );
    }
}
