//! ngxctl core library: domain types, registry persistence, config descriptors, errors.
//!
//! Public API surface:
//! - [`types`]: process IDs, roles, instance records
//! - [`error`]: [`RegistryError`]
//! - [`registry`]: load / save / write-through [`RegistryStore`]
//! - [`config`]: config descriptors, listen-port extraction, listing
//! - [`paths`]: `~/.ngxctl/` layout

pub mod config;
pub mod error;
pub mod paths;
pub mod registry;
pub mod types;

pub use config::{ConfigDescriptor, DEFAULT_LISTEN_PORT};
pub use error::RegistryError;
pub use registry::RegistryStore;
pub use types::{ConfigId, InstanceRecord, ProcessId, Registry, Role};
