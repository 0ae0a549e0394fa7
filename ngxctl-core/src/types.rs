//! Domain types for the ngxctl process registry.
//!
//! The serialized shape of [`InstanceRecord`] is fixed: registry files written
//! by earlier tooling must keep loading, so field names follow the on-disk
//! keys (`port`, `config_file`, `type`, `start_time`) rather than Rust names.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// An OS process ID. Serialized as a bare number, and as a quoted string when
/// used as a registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(pub u32);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u32> for ProcessId {
    fn from(pid: u32) -> Self {
        Self(pid)
    }
}

/// Name of the configuration file an instance was launched with
/// (e.g. `custom_site.conf`). Not unique across records.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigId(pub String);

impl ConfigId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ConfigId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConfigId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Role of a process within one launch. Exactly one primary per launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "master")]
    Primary,
    #[serde(rename = "worker")]
    Secondary,
}

impl Role {
    pub fn is_primary(self) -> bool {
        matches!(self, Role::Primary)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Primary => write!(f, "master"),
            Role::Secondary => write!(f, "worker"),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// One tracked OS process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    #[serde(rename = "port")]
    pub listen_port: u16,
    #[serde(rename = "config_file")]
    pub config: ConfigId,
    #[serde(rename = "type")]
    pub role: Role,
    /// Local wall-clock time at launch, second precision.
    #[serde(rename = "start_time", with = "start_time")]
    pub started_at: NaiveDateTime,
}

impl InstanceRecord {
    pub fn new(role: Role, listen_port: u16, config: ConfigId, started_at: NaiveDateTime) -> Self {
        Self {
            listen_port,
            config,
            role,
            started_at: truncate_to_seconds(started_at),
        }
    }
}

/// The persisted mapping of believed-live process IDs to their metadata.
pub type Registry = BTreeMap<ProcessId, InstanceRecord>;

/// Current local time truncated to whole seconds, the resolution the registry stores.
pub fn local_now() -> NaiveDateTime {
    truncate_to_seconds(Local::now().naive_local())
}

fn truncate_to_seconds(t: NaiveDateTime) -> NaiveDateTime {
    t.with_nanosecond(0).unwrap_or(t)
}

/// `start_time` wire format: `YYYY-MM-DD HH:MM:SS`, local time, no zone.
pub mod start_time {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(t: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&t.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
