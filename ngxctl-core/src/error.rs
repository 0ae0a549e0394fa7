//! Error types for ngxctl-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The persisted registry exists but could not be read or parsed.
    ///
    /// Callers may choose to reset to an empty registry instead of failing.
    #[error("registry at {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing the registry snapshot failed. The attempted mutation was not applied.
    #[error("failed to persist registry at {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (save path).
    #[error("JSON serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// `dirs::home_dir()` returned `None`; cannot locate `~/.ngxctl/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

impl RegistryError {
    pub fn is_corrupt(&self) -> bool {
        matches!(self, RegistryError::Corrupt { .. })
    }
}

pub(crate) fn corrupt(
    path: impl Into<PathBuf>,
    source: impl Into<std::io::Error>,
) -> RegistryError {
    RegistryError::Corrupt {
        path: path.into(),
        source: source.into(),
    }
}

pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> RegistryError {
    RegistryError::Persistence {
        path: path.into(),
        source,
    }
}
