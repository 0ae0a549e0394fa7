pub mod configs;
pub mod monitor;
pub mod reset;
pub mod start;
pub mod status;
pub mod stop;
pub mod validate;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use ngxctl_core::{paths, RegistryError};
use ngxctl_supervisor::{Settings, Supervisor, SupervisorError};

/// Overrides for [`Settings`]; anything left unset keeps its default.
#[derive(Args, Debug, Default)]
pub struct SettingsArgs {
    /// Server binary to launch.
    #[arg(long, global = true, value_name = "PATH")]
    pub binary: Option<PathBuf>,

    /// Extra argument passed to the binary before `-c <config>` (repeatable).
    #[arg(long = "binary-arg", global = true, value_name = "ARG", allow_hyphen_values = true)]
    pub binary_args: Vec<String>,

    /// Executable name used to discover worker processes.
    #[arg(long, global = true, value_name = "NAME")]
    pub process_name: Option<String>,

    /// Directory holding configuration files.
    #[arg(long, global = true, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Filename prefix that marks a file as a managed configuration.
    #[arg(long, global = true, value_name = "PREFIX")]
    pub config_prefix: Option<String>,

    /// Process registry file.
    #[arg(long, global = true, value_name = "PATH")]
    pub registry: Option<PathBuf>,

    /// Wait after spawning before discovering processes.
    #[arg(long, global = true, value_name = "MS")]
    pub settle_ms: Option<u64>,

    /// Give up on a launch or validation after this long.
    #[arg(long, global = true, value_name = "MS")]
    pub launch_timeout_ms: Option<u64>,
}

impl SettingsArgs {
    pub fn resolve(&self) -> Result<Settings> {
        let home = paths::home().context("could not determine home directory")?;
        let mut settings = Settings::for_home(&home);
        if let Some(binary) = &self.binary {
            settings.binary = binary.clone();
        }
        if !self.binary_args.is_empty() {
            settings.binary_args = self.binary_args.clone();
        }
        if let Some(name) = &self.process_name {
            settings.process_name = name.clone();
        }
        if let Some(dir) = &self.config_dir {
            settings.config_dir = dir.clone();
        }
        if let Some(prefix) = &self.config_prefix {
            settings.config_prefix = prefix.clone();
        }
        if let Some(registry) = &self.registry {
            settings.registry_path = registry.clone();
        }
        if let Some(ms) = self.settle_ms {
            settings.settle_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.launch_timeout_ms {
            settings.launch_timeout = Duration::from_millis(ms);
        }
        Ok(settings)
    }
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

pub fn open_supervisor(settings: Settings) -> Result<Supervisor> {
    let path = settings.registry_path.clone();
    Supervisor::open(settings)
        .with_context(|| format!("failed to open process registry {}", path.display()))
}

/// Attach a recovery hint when the failure is an unreadable registry.
pub fn with_reset_hint(err: anyhow::Error) -> anyhow::Error {
    let corrupt = err.chain().any(|cause| {
        cause
            .downcast_ref::<SupervisorError>()
            .is_some_and(SupervisorError::is_corrupt_registry)
            || cause
                .downcast_ref::<RegistryError>()
                .is_some_and(RegistryError::is_corrupt)
    });
    if corrupt {
        err.context("process registry is unreadable; run `ngxctl reset` to start with an empty one")
    } else {
        err
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialize JSON output")?
    );
    Ok(())
}
