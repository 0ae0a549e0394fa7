//! The [`Supervisor`] handle: settings, the process table and the one
//! authoritative registry copy.
//!
//! Launch, reconcile, stop and monitor are implemented in their own modules as
//! further `impl` blocks on this type.

use std::sync::Arc;

use tokio::sync::Mutex;

use ngxctl_core::{ConfigId, Registry, RegistryStore};

use crate::error::SupervisorError;
use crate::os::{ProcessTable, SystemProcessTable};
use crate::settings::Settings;

/// Cheaply cloneable; every clone shares the same registry lock.
///
/// All registry reads and mutations go through the single `Mutex`, so
/// `load → mutate → save` never interleaves between callers in this process.
/// Two separate processes pointing at one registry file is not supported.
pub struct Supervisor<P = SystemProcessTable> {
    pub(crate) settings: Arc<Settings>,
    pub(crate) registry: Arc<Mutex<RegistryStore>>,
    pub(crate) table: Arc<P>,
}

impl<P> Clone for Supervisor<P> {
    fn clone(&self) -> Self {
        Self {
            settings: self.settings.clone(),
            registry: self.registry.clone(),
            table: self.table.clone(),
        }
    }
}

impl Supervisor<SystemProcessTable> {
    /// Open the registry at `settings.registry_path` against the real process table.
    pub fn open(settings: Settings) -> Result<Self, SupervisorError> {
        Self::with_process_table(settings, SystemProcessTable::new())
    }
}

impl<P: ProcessTable> Supervisor<P> {
    pub fn with_process_table(settings: Settings, table: P) -> Result<Self, SupervisorError> {
        let store = RegistryStore::open(&settings.registry_path)?;
        Ok(Self::with_store(settings, store, table))
    }

    pub fn with_store(settings: Settings, store: RegistryStore, table: P) -> Self {
        Self {
            settings: Arc::new(settings),
            registry: Arc::new(Mutex::new(store)),
            table: Arc::new(table),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Copy of the in-memory registry. Does not consult the OS.
    pub async fn registry_snapshot(&self) -> Registry {
        self.registry.lock().await.snapshot()
    }
}

/// `None` and blank identifiers both mean nothing was selected.
pub(crate) fn require_config(config: Option<&ConfigId>) -> Result<ConfigId, SupervisorError> {
    match config {
        Some(id) if !id.is_blank() => Ok(id.clone()),
        _ => Err(SupervisorError::NoConfigSelected),
    }
}

/// Install the global `tracing` subscriber, writing to stderr.
///
/// `RUST_LOG` wins over `default_directive`. Safe to call more than once.
pub fn init_tracing(default_directive: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_config_is_not_selected() {
        assert!(matches!(require_config(None), Err(SupervisorError::NoConfigSelected)));
        let blank = ConfigId::from("  ");
        assert!(matches!(require_config(Some(&blank)), Err(SupervisorError::NoConfigSelected)));
        let id = ConfigId::from("custom_a.conf");
        assert_eq!(require_config(Some(&id)).expect("selected"), id);
    }
}
