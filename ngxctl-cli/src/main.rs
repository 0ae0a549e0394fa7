//! ngxctl: start, watch and stop nginx instances from named configurations.
//!
//! # Usage
//!
//! ```text
//! ngxctl start <config>
//! ngxctl stop <config>
//! ngxctl stop --all
//! ngxctl status [--json]
//! ngxctl monitor [--interval-secs N] [--json]
//! ngxctl validate <config>
//! ngxctl configs [--json]
//! ngxctl reset
//! ```
//!
//! Global flags (`--binary`, `--config-dir`, `--registry`, ...) override the
//! defaults rooted at `~/.ngxctl/`.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    configs::ConfigsArgs, monitor::MonitorArgs, reset::ResetArgs, start::StartArgs,
    status::StatusArgs, stop::StopArgs, validate::ValidateArgs, SettingsArgs,
};
use ngxctl_supervisor::init_tracing;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "ngxctl",
    version,
    about = "Supervise nginx instances launched from named configurations",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    settings: SettingsArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Launch nginx with a configuration and track its processes.
    Start(StartArgs),

    /// Stop the processes of one configuration, or everything with --all.
    Stop(StopArgs),

    /// Check tracked processes, prune dead ones, and show the survivors.
    Status(StatusArgs),

    /// Reconcile periodically until interrupted.
    Monitor(MonitorArgs),

    /// Dry-run a configuration with `nginx -t`.
    Validate(ValidateArgs),

    /// List available configurations.
    Configs(ConfigsArgs),

    /// Discard the process registry without signalling anything.
    Reset(ResetArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_log = match cli.command {
        Commands::Monitor(_) => "info",
        _ => "warn",
    };
    init_tracing(default_log);

    let settings = cli.settings.resolve()?;
    let result = match cli.command {
        Commands::Start(args) => args.run(settings),
        Commands::Stop(args) => args.run(settings),
        Commands::Status(args) => args.run(settings),
        Commands::Monitor(args) => args.run(settings),
        Commands::Validate(args) => args.run(settings),
        Commands::Configs(args) => args.run(settings),
        Commands::Reset(args) => args.run(settings),
    };
    result.map_err(commands::with_reset_hint)
}
