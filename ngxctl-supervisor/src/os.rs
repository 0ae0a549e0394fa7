//! OS process collaborator.
//!
//! [`ProcessTable`] is the seam between supervision logic and the live process
//! table. [`SystemProcessTable`] is the real Unix implementation: `sysinfo` for
//! enumeration and metrics, `libc::kill` for signals.

use std::io;
use std::sync::Mutex;

use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, System};

use ngxctl_core::ProcessId;

/// Point-in-time resource usage of a live process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessStats {
    pub resident_bytes: u64,
    /// `None` where the platform does not expose a thread count.
    pub threads: Option<u32>,
}

/// Result of sending a termination signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    Delivered,
    /// The process was already gone.
    NotFound,
}

pub trait ProcessTable: Send + Sync + 'static {
    /// Live process IDs whose executable name is exactly `name`.
    fn find_by_name(&self, name: &str) -> Vec<ProcessId>;

    /// Stats for `pid`, or `None` if it no longer exists. Zombies count as gone.
    fn probe(&self, pid: ProcessId) -> Option<ProcessStats>;

    /// Send a graceful termination request (SIGTERM).
    fn terminate(&self, pid: ProcessId) -> io::Result<SignalOutcome>;
}

/// The real process table.
///
/// One `sysinfo::System` is reused across calls; probes refresh only the
/// requested PID.
pub struct SystemProcessTable {
    system: Mutex<System>,
}

impl SystemProcessTable {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn with_system<T>(&self, f: impl FnOnce(&mut System) -> T) -> T {
        let mut guard = self.system.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

impl Default for SystemProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SystemProcessTable {
    fn find_by_name(&self, name: &str) -> Vec<ProcessId> {
        self.with_system(|sys| {
            sys.refresh_processes_specifics(ProcessRefreshKind::new());
            let mut pids: Vec<ProcessId> = sys
                .processes()
                .iter()
                .filter(|(_, process)| process.name() == name && !is_zombie(process.status()))
                .map(|(pid, _)| ProcessId(pid.as_u32()))
                .collect();
            pids.sort();
            pids
        })
    }

    fn probe(&self, pid: ProcessId) -> Option<ProcessStats> {
        self.with_system(|sys| {
            let sys_pid = Pid::from(pid.0 as usize);
            if !sys.refresh_process_specifics(sys_pid, ProcessRefreshKind::new().with_memory()) {
                return None;
            }
            let process = sys.process(sys_pid)?;
            if is_zombie(process.status()) {
                return None;
            }
            Some(ProcessStats {
                resident_bytes: process.memory(),
                threads: thread_count(pid),
            })
        })
    }

    fn terminate(&self, pid: ProcessId) -> io::Result<SignalOutcome> {
        send_sigterm(pid)
    }
}

fn is_zombie(status: ProcessStatus) -> bool {
    matches!(status, ProcessStatus::Zombie | ProcessStatus::Dead)
}

#[cfg(target_os = "linux")]
fn thread_count(pid: ProcessId) -> Option<u32> {
    let status = std::fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
    status
        .lines()
        .find_map(|line| line.strip_prefix("Threads:"))
        .and_then(|count| count.trim().parse().ok())
}

#[cfg(not(target_os = "linux"))]
fn thread_count(_pid: ProcessId) -> Option<u32> {
    None
}

#[cfg(unix)]
fn send_sigterm(pid: ProcessId) -> io::Result<SignalOutcome> {
    // 0 and anything above i32::MAX would address a process group, not a process.
    let raw = match i32::try_from(pid.0) {
        Ok(raw) if raw > 0 => raw,
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing to signal pid {pid}"),
            ))
        }
    };
    if unsafe { libc::kill(raw, libc::SIGTERM) } == 0 {
        return Ok(SignalOutcome::Delivered);
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(SignalOutcome::NotFound)
    } else {
        Err(err)
    }
}

#[cfg(not(unix))]
fn send_sigterm(_pid: ProcessId) -> io::Result<SignalOutcome> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "process signalling is only supported on Unix",
    ))
}
