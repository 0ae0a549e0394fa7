//! Configuration descriptors.
//!
//! A descriptor is an opaque named file in the config directory. The only
//! thing read from it is the first `listen` directive; validation of the rest
//! is left to the server binary itself.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::types::ConfigId;

/// Port assumed when a configuration has no usable `listen` directive.
pub const DEFAULT_LISTEN_PORT: u16 = 80;

/// Default file-name prefix for configurations managed by this tool.
pub const DEFAULT_CONFIG_PREFIX: &str = "custom_";

const CONFIG_EXTENSION: &str = ".conf";

/// A named configuration and where it lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDescriptor {
    pub id: ConfigId,
    pub path: PathBuf,
}

impl ConfigDescriptor {
    /// Resolve `id` inside `config_dir`. Pure, no I/O.
    pub fn resolve(config_dir: &Path, id: &ConfigId) -> Self {
        Self {
            id: id.clone(),
            path: config_dir.join(id.as_str()),
        }
    }

    /// Listen port of this configuration, falling back to [`DEFAULT_LISTEN_PORT`]
    /// when the file is unreadable or has no parseable `listen` directive.
    pub fn listen_port(&self) -> u16 {
        match fs::read_to_string(&self.path) {
            Ok(contents) => listen_port(&contents),
            Err(_) => DEFAULT_LISTEN_PORT,
        }
    }
}

/// Extract the listen port from configuration text.
///
/// The first `listen` directive decides. Accepted argument forms are `8080`,
/// `127.0.0.1:8080` and `[::]:8080`; trailing parameters such as
/// `default_server` are ignored. Anything else yields [`DEFAULT_LISTEN_PORT`].
pub fn listen_port(contents: &str) -> u16 {
    contents
        .lines()
        .map(strip_comment)
        .find_map(listen_argument)
        .and_then(parse_port)
        .unwrap_or(DEFAULT_LISTEN_PORT)
}

fn strip_comment(line: &str) -> &str {
    line.split('#').next().unwrap_or_default().trim()
}

fn listen_argument(line: &str) -> Option<&str> {
    let mut tokens = line.split_whitespace();
    if tokens.next()? != "listen" {
        return None;
    }
    // `listen 8080;` and `listen 8080 ;` both end up here.
    Some(tokens.next().unwrap_or(";").trim_end_matches(';'))
}

fn parse_port(arg: &str) -> Option<u16> {
    let port = match arg.rsplit_once(':') {
        Some((_, port)) => port,
        None => arg,
    };
    port.parse().ok().filter(|p| *p != 0)
}

/// List configuration identifiers in `dir`: regular files named
/// `<prefix>*.conf`, sorted. A missing directory lists as empty.
pub fn list_configs(dir: &Path, prefix: &str) -> std::io::Result<Vec<ConfigId>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(vec![]),
        Err(err) => return Err(err),
    };
    let mut ids: Vec<ConfigId> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(prefix) && name.ends_with(CONFIG_EXTENSION))
        .map(ConfigId::from)
        .collect();
    ids.sort();
    Ok(ids)
}
