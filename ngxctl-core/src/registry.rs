//! Persisted process registry.
//!
//! # Storage layout
//!
//! A single JSON object at `~/.ngxctl/nginx_pids.json` keyed by process ID:
//!
//! ```text
//! {
//!     "4242": {
//!         "port": 8080,
//!         "config_file": "custom_site.conf",
//!         "type": "master",
//!         "start_time": "2024-01-01 09:30:00"
//!     }
//! }
//! ```
//!
//! # API pattern
//!
//! [`load`] and [`save`] are the raw file operations. Everything else goes
//! through [`RegistryStore`], which keeps the authoritative copy in memory and
//! writes every mutation through to disk before applying it. No call site
//! should read-modify-write the file directly.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{corrupt, persistence, RegistryError};
use crate::types::{InstanceRecord, ProcessId, Registry};

// ---------------------------------------------------------------------------
// 1. Load
// ---------------------------------------------------------------------------

/// Load the registry at `path`.
///
/// A missing or blank file is an empty registry. Anything else that cannot be
/// read or parsed returns [`RegistryError::Corrupt`].
pub fn load(path: &Path) -> Result<Registry, RegistryError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Registry::new()),
        Err(err) => return Err(corrupt(path, err)),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Registry::new());
    }
    serde_json::from_slice(&bytes).map_err(|e| corrupt(path, e))
}

// ---------------------------------------------------------------------------
// 2. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically overwrite the registry at `path`.
///
/// Write flow: serialize → `<name>.tmp` sibling → `chmod 0600` → `rename`.
/// The `.tmp` file lives next to the target so the rename never crosses a filesystem.
pub fn save(path: &Path, registry: &Registry) -> Result<(), RegistryError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| persistence(dir, e))?;
            set_dir_permissions(dir)?;
        }
    }

    let bytes = to_json(registry)?;
    let tmp = tmp_path(path);
    fs::write(&tmp, bytes).map_err(|e| persistence(&tmp, e))?;
    set_file_permissions(&tmp)?;
    fs::rename(&tmp, path).map_err(|e| persistence(path, e))?;
    Ok(())
}

/// `<dir>/<file>.tmp`. Pure, no I/O.
pub fn tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{name}.tmp"))
}

/// Four-space indentation keeps files written by earlier tooling byte-stable.
fn to_json(registry: &Registry) -> Result<Vec<u8>, RegistryError> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    registry.serialize(&mut ser)?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// 3. Write-through store
// ---------------------------------------------------------------------------

/// In-memory registry with a write-through file snapshot.
///
/// Mutations build the next state, save it, and only then replace the
/// in-memory copy. A failed save leaves the store exactly as it was.
#[derive(Debug)]
pub struct RegistryStore {
    path: PathBuf,
    entries: Registry,
}

impl RegistryStore {
    /// Open the registry at `path` (see [`load`] for the missing/corrupt rules).
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let entries = load(&path)?;
        Ok(Self { path, entries })
    }

    /// A store with no entries and no I/O performed yet. Used to recover from
    /// a corrupt file; the next mutation (or [`RegistryStore::clear`]) overwrites it.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Registry::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, pid: ProcessId) -> Option<&InstanceRecord> {
        self.entries.get(&pid)
    }

    pub fn contains(&self, pid: ProcessId) -> bool {
        self.entries.contains_key(&pid)
    }

    /// Records in ascending process-ID order.
    pub fn records(&self) -> impl Iterator<Item = (ProcessId, &InstanceRecord)> {
        self.entries.iter().map(|(pid, record)| (*pid, record))
    }

    pub fn snapshot(&self) -> Registry {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn upsert(&mut self, pid: ProcessId, record: InstanceRecord) -> Result<(), RegistryError> {
        self.upsert_all([(pid, record)])
    }

    /// Insert or replace several records with a single save.
    pub fn upsert_all(
        &mut self,
        records: impl IntoIterator<Item = (ProcessId, InstanceRecord)>,
    ) -> Result<(), RegistryError> {
        let mut next = self.entries.clone();
        next.extend(records);
        self.commit(next)
    }

    pub fn remove(&mut self, pid: ProcessId) -> Result<Option<InstanceRecord>, RegistryError> {
        let mut removed = self.remove_all_matching(|candidate, _| *candidate == pid)?;
        Ok(removed.pop().map(|(_, record)| record))
    }

    /// Remove every record for which `predicate` returns true, saving once.
    ///
    /// Returns the removed records in ascending process-ID order. Nothing is
    /// written when nothing matches.
    pub fn remove_all_matching<F>(
        &mut self,
        mut predicate: F,
    ) -> Result<Vec<(ProcessId, InstanceRecord)>, RegistryError>
    where
        F: FnMut(&ProcessId, &InstanceRecord) -> bool,
    {
        let (removed, kept): (Registry, Registry) = self
            .entries
            .iter()
            .map(|(pid, record)| (*pid, record.clone()))
            .partition(|(pid, record)| predicate(pid, record));
        if removed.is_empty() {
            return Ok(Vec::new());
        }
        self.commit(kept)?;
        Ok(removed.into_iter().collect())
    }

    /// Replace the whole registry with an empty one. Always writes, so the
    /// persisted file is `{}` afterwards even if it was already empty.
    pub fn clear(&mut self) -> Result<Vec<ProcessId>, RegistryError> {
        let previous: Vec<ProcessId> = self.entries.keys().copied().collect();
        self.commit(Registry::new())?;
        Ok(previous)
    }

    /// Write the current in-memory state without mutating it.
    pub fn flush(&self) -> Result<(), RegistryError> {
        save(&self.path, &self.entries)
    }

    fn commit(&mut self, next: Registry) -> Result<(), RegistryError> {
        save(&self.path, &next)?;
        self.entries = next;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), RegistryError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700)).map_err(|e| persistence(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), RegistryError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), RegistryError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| persistence(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), RegistryError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
