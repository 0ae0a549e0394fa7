use std::path::PathBuf;

use thiserror::Error;

use ngxctl_core::{ConfigId, RegistryError};

/// Error surface for launch, reconciliation, termination and monitoring.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("no configuration selected")]
    NoConfigSelected,

    #[error("failed to launch {config}: {reason}")]
    LaunchFailure { config: ConfigId, reason: String },

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("background task failed: {0}")]
    Task(String),
}

impl SupervisorError {
    /// True when the persisted registry could not be read; the caller may reset it.
    pub fn is_corrupt_registry(&self) -> bool {
        matches!(self, SupervisorError::Registry(err) if err.is_corrupt())
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SupervisorError {
    SupervisorError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn launch_failure(config: &ConfigId, reason: impl Into<String>) -> SupervisorError {
    SupervisorError::LaunchFailure {
        config: config.clone(),
        reason: reason.into(),
    }
}

pub(crate) fn join_err(task: &str, err: tokio::task::JoinError) -> SupervisorError {
    SupervisorError::Task(format!("{task} task join failure: {err}"))
}
