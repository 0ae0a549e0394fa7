//! Liveness reconciliation: cross-check the registry against the OS and prune.
//!
//! Reconciling looks read-only but is not: every dead PID it finds is removed
//! from the persisted registry in the same call.

use std::collections::HashSet;

use chrono::NaiveDateTime;
use serde::Serialize;

use ngxctl_core::types::local_now;
use ngxctl_core::{ConfigId, InstanceRecord, ProcessId, Role};

use crate::error::{join_err, SupervisorError};
use crate::os::{ProcessStats, ProcessTable};
use crate::supervisor::Supervisor;

/// A tracked process confirmed alive by the last reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveInstance {
    pub pid: ProcessId,
    pub role: Role,
    pub listen_port: u16,
    pub config: ConfigId,
    #[serde(with = "ngxctl_core::types::start_time")]
    pub started_at: NaiveDateTime,
    pub elapsed_secs: i64,
    pub resident_bytes: u64,
    pub threads: Option<u32>,
    /// Not sampled; always `None`.
    pub cpu_percent: Option<f32>,
}

impl LiveInstance {
    fn new(
        pid: ProcessId,
        record: InstanceRecord,
        stats: ProcessStats,
        now: NaiveDateTime,
    ) -> Self {
        let elapsed_secs = (now - record.started_at).num_seconds().max(0);
        Self {
            pid,
            role: record.role,
            listen_port: record.listen_port,
            config: record.config,
            started_at: record.started_at,
            elapsed_secs,
            resident_bytes: stats.resident_bytes,
            threads: stats.threads,
            cpu_percent: None,
        }
    }

    /// Runtime as `HH:MM:SS`; hours keep counting past 24.
    pub fn elapsed(&self) -> String {
        format_hms(self.elapsed_secs)
    }

    pub fn resident_mib(&self) -> f64 {
        self.resident_bytes as f64 / (1024.0 * 1024.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    /// Live processes in ascending PID order.
    pub live: Vec<LiveInstance>,
    /// PIDs removed from the registry by this pass.
    pub pruned: Vec<ProcessId>,
    #[serde(with = "ngxctl_core::types::start_time")]
    pub checked_at: NaiveDateTime,
}

impl ReconciliationReport {
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

impl<P: ProcessTable> Supervisor<P> {
    /// Probe every tracked PID, drop the dead ones, and report the rest.
    ///
    /// The registry lock is held only to snapshot and to prune. Probes run
    /// unlocked on the blocking pool, one PID at a time, so other operations
    /// can interleave between them.
    pub async fn reconcile(&self) -> Result<ReconciliationReport, SupervisorError> {
        let snapshot: Vec<(ProcessId, InstanceRecord)> = {
            let store = self.registry.lock().await;
            store.records().map(|(pid, record)| (pid, record.clone())).collect()
        };

        let now = local_now();
        let mut live = Vec::with_capacity(snapshot.len());
        let mut dead = HashSet::new();
        for (pid, record) in snapshot {
            let table = self.table.clone();
            let stats = tokio::task::spawn_blocking(move || table.probe(pid))
                .await
                .map_err(|err| join_err("probe", err))?;
            match stats {
                Some(stats) => live.push(LiveInstance::new(pid, record, stats, now)),
                None => {
                    tracing::debug!(pid = %pid, "tracked process is gone");
                    dead.insert(pid);
                }
            }
        }

        let pruned = {
            let mut store = self.registry.lock().await;
            let removed = store.remove_all_matching(|pid, _| dead.contains(pid))?;
            // Stopped while we were probing.
            live.retain(|instance| store.contains(instance.pid));
            removed.into_iter().map(|(pid, _)| pid).collect::<Vec<_>>()
        };

        for pid in &pruned {
            tracing::info!(pid = %pid, "pruned dead process from registry");
        }

        Ok(ReconciliationReport {
            live,
            pruned,
            checked_at: now,
        })
    }
}

pub fn format_hms(total_secs: i64) -> String {
    let secs = total_secs.max(0);
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
