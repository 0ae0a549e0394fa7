//! `ngxctl monitor`: reconcile on an interval until Ctrl-C.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use ngxctl_supervisor::Settings;

use super::{open_supervisor, print_json, runtime, status::print_report};

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Seconds between passes (defaults to the configured monitor interval).
    #[arg(long, value_name = "SECS")]
    pub interval_secs: Option<u64>,

    /// Emit one JSON report per pass.
    #[arg(long)]
    pub json: bool,
}

impl MonitorArgs {
    pub fn run(self, settings: Settings) -> Result<()> {
        let interval = self
            .interval_secs
            .map(Duration::from_secs)
            .unwrap_or(settings.monitor_interval);
        if interval.is_zero() {
            anyhow::bail!("--interval-secs must be greater than zero");
        }

        let rt = runtime()?;
        let supervisor = open_supervisor(settings)?;
        rt.block_on(async move {
            let (handle, mut reports) = supervisor.start_monitoring(interval);
            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);
            loop {
                tokio::select! {
                    _ = &mut ctrl_c => break,
                    next = reports.recv() => {
                        let Some(report) = next else { break };
                        match report {
                            Ok(report) if self.json => print_json(&report)?,
                            Ok(report) => {
                                print_report(&report);
                                println!();
                            }
                            Err(err) => eprintln!("{} {err}", "error".red().bold()),
                        }
                    }
                }
            }
            handle.stop().await.context("monitor did not shut down cleanly")
        })
    }
}
