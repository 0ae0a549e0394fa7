use std::path::{Path, PathBuf};
use std::time::Duration;

use ngxctl_core::config::DEFAULT_CONFIG_PREFIX;
use ngxctl_core::paths;

pub const DEFAULT_BINARY: &str = "nginx";
pub const DEFAULT_PROCESS_NAME: &str = "nginx";

/// Wait after spawning before looking for the processes it produced.
pub const SETTLE_DELAY: Duration = Duration::from_secs(1);
pub const LAUNCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const MONITOR_INTERVAL: Duration = Duration::from_secs(10);

/// Everything a [`crate::Supervisor`] needs to know about its environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Server binary, resolved through `$PATH` when not absolute.
    pub binary: PathBuf,
    /// Arguments placed before `-c <config>` (e.g. `-p <prefix>`).
    pub binary_args: Vec<String>,
    /// Executable name used to discover worker processes after launch.
    pub process_name: String,
    pub config_dir: PathBuf,
    pub config_prefix: String,
    pub registry_path: PathBuf,
    /// Where each launched server's stderr is appended, one file per config.
    pub log_dir: PathBuf,
    pub settle_delay: Duration,
    pub launch_timeout: Duration,
    pub monitor_interval: Duration,
}

impl Settings {
    /// Defaults rooted at `<home>/.ngxctl/`.
    pub fn for_home(home: &Path) -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_BINARY),
            binary_args: Vec::new(),
            process_name: DEFAULT_PROCESS_NAME.to_string(),
            config_dir: paths::config_dir(home),
            config_prefix: DEFAULT_CONFIG_PREFIX.to_string(),
            registry_path: paths::registry_path(home),
            log_dir: paths::log_dir(home),
            settle_delay: SETTLE_DELAY,
            launch_timeout: LAUNCH_TIMEOUT,
            monitor_interval: MONITOR_INTERVAL,
        }
    }
}
