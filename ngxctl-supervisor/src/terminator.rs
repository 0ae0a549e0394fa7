//! Termination: SIGTERM tracked processes and drop their records.

use std::io;

use serde::Serialize;

use ngxctl_core::{ConfigId, InstanceRecord, ProcessId};

use crate::error::SupervisorError;
use crate::os::{ProcessTable, SignalOutcome};
use crate::supervisor::Supervisor;

/// A signal the OS refused for a reason other than the process being gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalFailure {
    pub pid: ProcessId,
    pub error: String,
}

/// Outcome of a stop request. None of its states is an error.
///
/// `had_no_matches` means nothing was tracked for the selection. An empty
/// `stopped` with matches means every selected process was already dead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StopResult {
    pub stopped: Vec<ProcessId>,
    pub had_no_matches: bool,
    pub failed: Vec<SignalFailure>,
}

impl<P: ProcessTable> Supervisor<P> {
    /// Stop every process launched from `config` and forget it.
    ///
    /// Records are removed whether or not the signal landed; the registry is
    /// written once at the end.
    pub async fn stop_by_config(&self, config: &ConfigId) -> Result<StopResult, SupervisorError> {
        let mut store = self.registry.lock().await;
        let selected: Vec<(ProcessId, InstanceRecord)> = store
            .records()
            .filter(|(_, record)| &record.config == config)
            .map(|(pid, record)| (pid, record.clone()))
            .collect();

        if selected.is_empty() {
            tracing::info!(config = %config, "no tracked processes for config");
            return Ok(StopResult {
                had_no_matches: true,
                ..StopResult::default()
            });
        }

        let mut result = self.signal_all(selected.iter().map(|(pid, _)| *pid));
        store.remove_all_matching(|_, record| &record.config == config)?;
        result.stopped.sort();
        tracing::info!(
            config = %config,
            stopped = result.stopped.len(),
            failed = result.failed.len(),
            "stopped config"
        );
        Ok(result)
    }

    /// Stop everything tracked and reset the registry to empty.
    ///
    /// The registry is rewritten as `{}` even when it was already empty.
    pub async fn stop_all(&self) -> Result<StopResult, SupervisorError> {
        let mut store = self.registry.lock().await;
        let pids: Vec<ProcessId> = store.records().map(|(pid, _)| pid).collect();
        let had_no_matches = pids.is_empty();

        let mut result = self.signal_all(pids.into_iter());
        result.had_no_matches = had_no_matches;
        store.clear()?;
        tracing::info!(
            stopped = result.stopped.len(),
            failed = result.failed.len(),
            "stopped all tracked processes"
        );
        Ok(result)
    }

    fn signal_all(&self, pids: impl Iterator<Item = ProcessId>) -> StopResult {
        let mut result = StopResult::default();
        for pid in pids {
            match self.table.terminate(pid) {
                Ok(SignalOutcome::Delivered) => result.stopped.push(pid),
                Ok(SignalOutcome::NotFound) => {
                    tracing::debug!(pid = %pid, "process already gone");
                }
                Err(err) => {
                    tracing::warn!(pid = %pid, error = %err, "failed to signal process");
                    result.failed.push(SignalFailure {
                        pid,
                        error: describe(&err),
                    });
                }
            }
        }
        result
    }
}

fn describe(err: &io::Error) -> String {
    match err.kind() {
        io::ErrorKind::PermissionDenied => "permission denied".to_string(),
        _ => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use chrono::NaiveDate;
    use ngxctl_core::{registry, RegistryStore, Role};
    use tempfile::TempDir;

    use crate::os::fake::FakeProcessTable;
    use crate::settings::Settings;

    fn record(role: Role, config: &str) -> InstanceRecord {
        let started = NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .expect("datetime");
        InstanceRecord::new(role, 8080, ConfigId::from(config), started)
    }

    /// Two configs: `a` with 10 (master) + 11, `b` with 20 (master).
    fn two_configs(home: &TempDir, table: FakeProcessTable) -> Supervisor<FakeProcessTable> {
        let settings = Settings::for_home(home.path());
        let mut store = RegistryStore::open(&settings.registry_path).expect("open");
        store
            .upsert_all([
                (ProcessId(10), record(Role::Primary, "custom_a.conf")),
                (ProcessId(11), record(Role::Secondary, "custom_a.conf")),
                (ProcessId(20), record(Role::Primary, "custom_b.conf")),
            ])
            .expect("seed");
        Supervisor::with_store(settings, store, table)
    }

    #[tokio::test]
    async fn stop_by_config_signals_and_removes_only_that_config() {
        let home = TempDir::new().expect("home");
        let table = FakeProcessTable::with_live(&[(10, "nginx"), (11, "nginx"), (20, "nginx")]);
        let sup = two_configs(&home, table);

        let result = sup.stop_by_config(&ConfigId::from("custom_a.conf")).await.expect("stop");
        assert_eq!(result.stopped, vec![ProcessId(10), ProcessId(11)]);
        assert!(!result.had_no_matches);
        assert!(result.failed.is_empty());

        let persisted = registry::load(&sup.settings().registry_path).expect("load");
        assert_eq!(persisted.keys().copied().collect::<Vec<_>>(), vec![ProcessId(20)]);
        assert!(sup.table.is_live(20));
    }

    #[tokio::test]
    async fn second_stop_is_a_no_op() {
        let home = TempDir::new().expect("home");
        let sup = two_configs(&home, FakeProcessTable::with_live(&[(10, "nginx"), (11, "nginx")]));
        let config = ConfigId::from("custom_a.conf");

        sup.stop_by_config(&config).await.expect("first");
        let again = sup.stop_by_config(&config).await.expect("second");
        assert!(again.stopped.is_empty());
        assert!(again.had_no_matches);
        assert_eq!(sup.table.signalled(), vec![ProcessId(10), ProcessId(11)]);
    }

    #[tokio::test]
    async fn already_dead_processes_are_removed_without_error() {
        let home = TempDir::new().expect("home");
        let sup = two_configs(&home, FakeProcessTable::default());

        let result = sup.stop_by_config(&ConfigId::from("custom_a.conf")).await.expect("stop");
        assert!(result.stopped.is_empty());
        assert!(!result.had_no_matches);
        assert_eq!(sup.registry_snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn unknown_config_has_no_matches() {
        let home = TempDir::new().expect("home");
        let sup = two_configs(&home, FakeProcessTable::default());

        let result = sup.stop_by_config(&ConfigId::from("custom_zzz.conf")).await.expect("stop");
        assert!(result.had_no_matches);
        assert_eq!(sup.registry_snapshot().await.len(), 3);
    }

    #[tokio::test]
    async fn refused_signal_is_reported_and_record_still_removed() {
        let home = TempDir::new().expect("home");
        let table = FakeProcessTable::with_live(&[(10, "nginx"), (11, "nginx")]);
        table.refuse(11);
        let sup = two_configs(&home, table);

        let result = sup.stop_by_config(&ConfigId::from("custom_a.conf")).await.expect("stop");
        assert_eq!(result.stopped, vec![ProcessId(10)]);
        assert_eq!(
            result.failed,
            vec![SignalFailure {
                pid: ProcessId(11),
                error: "permission denied".into()
            }]
        );
        assert!(!sup.registry_snapshot().await.contains_key(&ProcessId(11)));

        let value = serde_json::to_value(&result).expect("serialize");
        assert_eq!(value["stopped"], serde_json::json!([10]));
        assert_eq!(value["had_no_matches"], serde_json::json!(false));
        assert_eq!(value["failed"][0]["pid"], serde_json::json!(11));
        assert_eq!(value["failed"][0]["error"], "permission denied");
    }

    #[tokio::test]
    async fn stop_all_resets_registry_to_empty_object() {
        let home = TempDir::new().expect("home");
        let sup = two_configs(&home, FakeProcessTable::with_live(&[(10, "nginx"), (20, "nginx")]));

        let result = sup.stop_all().await.expect("stop all");
        assert_eq!(result.stopped, vec![ProcessId(10), ProcessId(20)]);
        assert!(!result.had_no_matches);
        let on_disk = fs::read_to_string(&sup.settings().registry_path).expect("read");
        assert_eq!(on_disk, "{}");
    }

    #[tokio::test]
    async fn stop_all_on_empty_registry_still_writes() {
        let home = TempDir::new().expect("home");
        let settings = Settings::for_home(home.path());
        let path = settings.registry_path.clone();
        let sup = Supervisor::with_process_table(settings, FakeProcessTable::default())
            .expect("open");

        let result = sup.stop_all().await.expect("stop all");
        assert!(result.had_no_matches);
        assert_eq!(fs::read_to_string(path).expect("read"), "{}");
    }
}
