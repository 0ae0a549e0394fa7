//! `ngxctl status`: reconcile and show what is still running.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use ngxctl_core::Role;
use ngxctl_supervisor::{LiveInstance, ReconciliationReport, Settings};

use super::{open_supervisor, print_json, runtime};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, settings: Settings) -> Result<()> {
        let rt = runtime()?;
        let supervisor = open_supervisor(settings)?;
        let report = rt
            .block_on(supervisor.reconcile())
            .context("failed to check tracked processes")?;

        if self.json {
            return print_json(&report);
        }
        print_report(&report);
        Ok(())
    }
}

#[derive(Tabled)]
struct InstanceRow {
    #[tabled(rename = "pid")]
    pid: String,
    #[tabled(rename = "type")]
    role: String,
    #[tabled(rename = "port")]
    port: u16,
    #[tabled(rename = "config")]
    config: String,
    #[tabled(rename = "started")]
    started: String,
    #[tabled(rename = "uptime")]
    uptime: String,
    #[tabled(rename = "memory")]
    memory: String,
    #[tabled(rename = "threads")]
    threads: String,
    #[tabled(rename = "cpu")]
    cpu: String,
}

impl From<&LiveInstance> for InstanceRow {
    fn from(instance: &LiveInstance) -> Self {
        Self {
            pid: instance.pid.to_string(),
            role: role_label(instance.role),
            port: instance.listen_port,
            config: instance.config.to_string(),
            started: format_time(instance.started_at),
            uptime: instance.elapsed(),
            memory: format!("{:.1} MiB", instance.resident_mib()),
            threads: instance
                .threads
                .map_or_else(|| "-".to_string(), |count| count.to_string()),
            cpu: instance
                .cpu_percent
                .map_or_else(|| "N/A".to_string(), |pct| format!("{pct:.1}%")),
        }
    }
}

/// Shared with `ngxctl monitor`.
pub(crate) fn print_report(report: &ReconciliationReport) {
    for pid in &report.pruned {
        println!("{} pid {pid} is no longer running", "pruned".yellow().bold());
    }

    let masters = report.live.iter().filter(|i| i.role.is_primary()).count();
    println!(
        "ngxctl v{} | {} running | {} masters | checked {}",
        env!("CARGO_PKG_VERSION"),
        report.live.len(),
        masters,
        format_time(report.checked_at),
    );

    if report.live.is_empty() {
        println!("No nginx instances running.");
        return;
    }

    let rows: Vec<InstanceRow> = report.live.iter().map(InstanceRow::from).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn role_label(role: Role) -> String {
    match role {
        Role::Primary => "master".green().bold().to_string(),
        Role::Secondary => "worker".to_string(),
    }
}

fn format_time(t: NaiveDateTime) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}
