//! On-disk layout under `~/.ngxctl/`.
//!
//! ```text
//! ~/.ngxctl/
//!   nginx_pids.json   (process registry, mode 0600)
//!   conf/             (configuration descriptors, custom_*.conf)
//!   logs/             (stderr of launched servers, <config>.stderr)
//! ```
//!
//! Every helper takes an explicit `home`; [`home`] resolves the real one.

use std::path::{Path, PathBuf};

use crate::error::RegistryError;

pub const STATE_DIR: &str = ".ngxctl";
pub const REGISTRY_FILE: &str = "nginx_pids.json";
pub const CONFIG_DIR: &str = "conf";
pub const LOG_DIR: &str = "logs";

pub fn state_root(home: &Path) -> PathBuf {
    home.join(STATE_DIR)
}

pub fn registry_path(home: &Path) -> PathBuf {
    state_root(home).join(REGISTRY_FILE)
}

pub fn config_dir(home: &Path) -> PathBuf {
    state_root(home).join(CONFIG_DIR)
}

pub fn log_dir(home: &Path) -> PathBuf {
    state_root(home).join(LOG_DIR)
}

pub fn home() -> Result<PathBuf, RegistryError> {
    dirs::home_dir().ok_or(RegistryError::HomeNotFound)
}
