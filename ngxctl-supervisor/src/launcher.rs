//! Launching the server binary and registering the processes it produced.
//!
//! The spawned child's PID is the authoritative primary while the child is
//! still running after the settle delay. A binary that daemonizes exits with
//! success instead; its primary is then the lowest same-named PID not already
//! tracked. Same-named secondaries are a best-effort guess: processes with the
//! same executable name started outside this tool cannot be told apart.
//!
//! The registry lock is held from the tracked-PID filter through the upsert,
//! so concurrent launches never claim the same discovered process.
//!
//! The child's stderr is appended to `<log_dir>/<config>.stderr` rather than a
//! pipe, so the server keeps a valid stderr after the caller exits.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use chrono::NaiveDateTime;
use serde::Serialize;
use tokio::process::{Child, Command};

use ngxctl_core::types::local_now;
use ngxctl_core::{ConfigDescriptor, ConfigId, InstanceRecord, ProcessId, Role};

use crate::error::{io_err, join_err, launch_failure, SupervisorError};
use crate::os::ProcessTable;
use crate::supervisor::{require_config, Supervisor};

#[derive(Debug, Clone, Serialize)]
pub struct LaunchResult {
    pub config: ConfigId,
    pub listen_port: u16,
    pub primary: ProcessId,
    pub secondaries: Vec<ProcessId>,
    #[serde(with = "ngxctl_core::types::start_time")]
    pub started_at: NaiveDateTime,
    /// File the server's stderr is appended to.
    pub stderr_log: PathBuf,
}

impl LaunchResult {
    /// Primary first, then secondaries in ascending order.
    pub fn pids(&self) -> impl Iterator<Item = ProcessId> + '_ {
        std::iter::once(self.primary).chain(self.secondaries.iter().copied())
    }
}

/// Outcome of a `-t` dry run. `diagnostics` is the binary's stdout followed by
/// its stderr, unmodified.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub config: ConfigId,
    pub success: bool,
    pub diagnostics: String,
}

#[derive(Debug, Clone, Copy)]
enum ChildState {
    Running,
    Daemonized,
}

/// Per-config stderr file and the offset where this launch's output begins.
struct StderrLog {
    path: PathBuf,
    start: u64,
}

impl StderrLog {
    fn open(dir: &Path, config: &ConfigId) -> Result<(Self, File), SupervisorError> {
        fs::create_dir_all(dir).map_err(|err| io_err(dir, err))?;
        let path = stderr_log_path(dir, config);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| io_err(&path, err))?;
        let start = file.metadata().map_err(|err| io_err(&path, err))?.len();
        Ok((Self { path, start }, file))
    }

    /// Whatever this launch has written so far, trimmed.
    async fn read_new(&self) -> String {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let start = usize::try_from(self.start)
                    .map_or(bytes.len(), |start| start.min(bytes.len()));
                String::from_utf8_lossy(&bytes[start..]).trim().to_string()
            }
            Err(err) => {
                tracing::debug!(path = %self.path.display(), error = %err, "stderr log unreadable");
                String::new()
            }
        }
    }
}

/// `<dir>/<config>.stderr`, with path separators in the config name flattened.
pub fn stderr_log_path(dir: &Path, config: &ConfigId) -> PathBuf {
    let name: String = config
        .as_str()
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    dir.join(format!("{name}.stderr"))
}

impl<P: ProcessTable> Supervisor<P> {
    /// Start the server with `config` and register every process it produced.
    ///
    /// Fails with [`SupervisorError::NoConfigSelected`] when `config` is `None`
    /// or blank, and with [`SupervisorError::LaunchFailure`] when the binary
    /// cannot start, exits with failure, produces no discoverable process, or
    /// does not settle within `launch_timeout`.
    pub async fn launch(
        &self,
        config: Option<&ConfigId>,
    ) -> Result<LaunchResult, SupervisorError> {
        let config = require_config(config)?;
        let descriptor = ConfigDescriptor::resolve(&self.settings.config_dir, &config);
        let listen_port = descriptor.listen_port();
        let (log, stderr) = StderrLog::open(&self.settings.log_dir, &config)?;

        let mut command = self.server_command(&descriptor, false);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr));
        let mut child = command.spawn().map_err(|err| {
            launch_failure(
                &config,
                format!("cannot start {}: {err}", self.settings.binary.display()),
            )
        })?;
        let spawned = child.id().map(ProcessId);
        tracing::info!(config = %config, pid = ?spawned, "spawned server binary");

        let timeout = self.settings.launch_timeout;
        let registration =
            self.settle_and_register(&config, listen_port, &mut child, spawned, &log);
        let outcome = tokio::time::timeout(timeout, registration).await;
        let (result, state) = match outcome {
            Ok(Ok(registered)) => registered,
            Ok(Err(err)) => {
                let _ = child.start_kill();
                return Err(err);
            }
            Err(_) => {
                let _ = child.start_kill();
                return Err(launch_failure(
                    &config,
                    format!("no result within {}ms", timeout.as_millis()),
                ));
            }
        };

        tracing::info!(
            config = %config,
            primary = %result.primary,
            secondaries = result.secondaries.len(),
            port = listen_port,
            "instance registered",
        );

        if matches!(state, ChildState::Running) {
            watch_child(child, result.primary);
        }
        Ok(result)
    }

    /// Run `<binary> -t -c <config>` and report its verdict.
    pub async fn validate(
        &self,
        config: Option<&ConfigId>,
    ) -> Result<ValidationReport, SupervisorError> {
        let config = require_config(config)?;
        let descriptor = ConfigDescriptor::resolve(&self.settings.config_dir, &config);

        let mut command = self.server_command(&descriptor, true);
        command.stdin(Stdio::null()).kill_on_drop(true);

        let timeout = self.settings.launch_timeout;
        let binary = &self.settings.binary;
        let output = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| {
                io_err(
                    binary,
                    io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("validation did not finish within {}ms", timeout.as_millis()),
                    ),
                )
            })?
            .map_err(|err| io_err(binary, err))?;

        let mut diagnostics = String::from_utf8_lossy(&output.stdout).into_owned();
        diagnostics.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(ValidationReport {
            config,
            success: output.status.success(),
            diagnostics,
        })
    }

    fn server_command(&self, descriptor: &ConfigDescriptor, test_only: bool) -> Command {
        let mut command = Command::new(&self.settings.binary);
        command.args(&self.settings.binary_args);
        if test_only {
            command.arg("-t");
        }
        command.arg("-c").arg(&descriptor.path);
        command
    }

    async fn settle_and_register(
        &self,
        config: &ConfigId,
        listen_port: u16,
        child: &mut Child,
        spawned: Option<ProcessId>,
        log: &StderrLog,
    ) -> Result<(LaunchResult, ChildState), SupervisorError> {
        tokio::time::sleep(self.settings.settle_delay).await;

        let state = match child.try_wait() {
            Ok(None) => ChildState::Running,
            Ok(Some(status)) if status.success() => ChildState::Daemonized,
            Ok(Some(status)) => {
                let diagnostics = log.read_new().await;
                return Err(launch_failure(config, exit_reason(status, &diagnostics)));
            }
            Err(err) => return Err(io_err(&self.settings.binary, err)),
        };

        let mut store = self.registry.lock().await;
        let mut found = self.discover().await?;
        found.retain(|pid| !store.contains(*pid));

        let primary = match (state, spawned) {
            (ChildState::Running, Some(pid)) => Some(pid),
            _ => found.first().copied(),
        };
        let Some(primary) = primary else {
            return Err(launch_failure(
                config,
                format!(
                    "no `{}` process found {}ms after start",
                    self.settings.process_name,
                    self.settings.settle_delay.as_millis()
                ),
            ));
        };
        found.retain(|pid| *pid != primary);

        let started_at = local_now();
        let result = LaunchResult {
            config: config.clone(),
            listen_port,
            primary,
            secondaries: found,
            started_at,
            stderr_log: log.path.clone(),
        };
        let records = result.pids().map(|pid| {
            let role = if pid == primary { Role::Primary } else { Role::Secondary };
            (pid, InstanceRecord::new(role, listen_port, config.clone(), started_at))
        });
        store.upsert_all(records)?;
        Ok((result, state))
    }

    async fn discover(&self) -> Result<Vec<ProcessId>, SupervisorError> {
        let table = self.table.clone();
        let name = self.settings.process_name.clone();
        let mut found = tokio::task::spawn_blocking(move || table.find_by_name(&name))
            .await
            .map_err(|err| join_err("discovery", err))?;
        found.sort();
        found.dedup();
        Ok(found)
    }
}

/// Reap a still-running child once it exits.
fn watch_child(mut child: Child, pid: ProcessId) {
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => tracing::info!(pid = %pid, %status, "supervised process exited"),
            Err(err) => {
                tracing::warn!(pid = %pid, error = %err, "failed to wait on supervised process")
            }
        }
    });
}

fn exit_reason(status: ExitStatus, diagnostics: &str) -> String {
    if diagnostics.is_empty() {
        format!("server binary {status}")
    } else {
        format!("server binary {status}: {diagnostics}")
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    use ngxctl_core::RegistryStore;
    use tempfile::TempDir;

    use crate::os::fake::FakeProcessTable;
    use crate::os::SystemProcessTable;
    use crate::settings::Settings;

    /// Settings that run `sh <script>` in place of the server binary.
    fn settings_with_script(home: &TempDir, script: &str) -> Settings {
        let script_path = home.path().join("fake-nginx.sh");
        fs::write(&script_path, script).expect("write script");

        let mut settings = Settings::for_home(home.path());
        settings.binary = PathBuf::from("/bin/sh");
        settings.binary_args = vec![script_path.display().to_string()];
        settings.settle_delay = Duration::from_millis(200);
        settings.launch_timeout = Duration::from_secs(5);
        fs::create_dir_all(&settings.config_dir).expect("config dir");
        fs::write(settings.config_dir.join("custom_a.conf"), "server {\n    listen 8080;\n}\n")
            .expect("write config");
        settings
    }

    fn supervisor<T: ProcessTable>(settings: Settings, table: T) -> Supervisor<T> {
        Supervisor::with_process_table(settings, table).expect("open supervisor")
    }

    fn conf() -> ConfigId {
        ConfigId::from("custom_a.conf")
    }

    #[tokio::test]
    async fn launch_without_config_is_rejected() {
        let home = TempDir::new().expect("home");
        let sup = supervisor(settings_with_script(&home, "exit 0\n"), FakeProcessTable::default());
        let err = sup.launch(None).await.unwrap_err();
        assert!(matches!(err, SupervisorError::NoConfigSelected), "got: {err}");
        assert!(sup.registry_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn daemonizing_binary_uses_discovered_pids() {
        let home = TempDir::new().expect("home");
        let settings = settings_with_script(&home, "exit 0\n");
        let registry_path = settings.registry_path.clone();
        let table = FakeProcessTable::with_live(&[(501, "nginx"), (500, "nginx"), (900, "bash")]);
        let sup = supervisor(settings, table);

        let result = sup.launch(Some(&conf())).await.expect("launch");
        assert_eq!(result.primary, ProcessId(500));
        assert_eq!(result.secondaries, vec![ProcessId(501)]);
        assert_eq!(result.listen_port, 8080);

        let persisted = ngxctl_core::registry::load(&registry_path).expect("load");
        assert_eq!(persisted.len(), 2);
        assert_eq!(persisted[&ProcessId(500)].role, Role::Primary);
        assert_eq!(persisted[&ProcessId(501)].role, Role::Secondary);
        assert!(persisted.values().all(|r| r.config == conf() && r.listen_port == 8080));
    }

    #[tokio::test]
    async fn already_tracked_pids_are_not_rediscovered() {
        let home = TempDir::new().expect("home");
        let settings = settings_with_script(&home, "exit 0\n");
        let mut store = RegistryStore::open(&settings.registry_path).expect("open");
        store
            .upsert(
                ProcessId(500),
                InstanceRecord::new(
                    Role::Primary,
                    80,
                    ConfigId::from("custom_old.conf"),
                    local_now(),
                ),
            )
            .expect("seed");
        let table = FakeProcessTable::with_live(&[(500, "nginx"), (601, "nginx"), (602, "nginx")]);
        let sup = Supervisor::with_store(settings, store, table);

        let result = sup.launch(Some(&conf())).await.expect("launch");
        assert_eq!(result.primary, ProcessId(601));
        assert_eq!(result.secondaries, vec![ProcessId(602)]);

        let snapshot = sup.registry_snapshot().await;
        assert_eq!(snapshot[&ProcessId(500)].config, ConfigId::from("custom_old.conf"));
        let primaries = snapshot
            .values()
            .filter(|r| r.config == conf() && r.role.is_primary())
            .count();
        assert_eq!(primaries, 1, "exactly one primary per launch");
    }

    #[tokio::test]
    async fn failing_binary_reports_stderr() {
        let home = TempDir::new().expect("home");
        let script = "echo 'nginx: [emerg] unknown directive \"lisen\"' >&2\nexit 1\n";
        let sup = supervisor(settings_with_script(&home, script), FakeProcessTable::default());

        let err = sup.launch(Some(&conf())).await.unwrap_err();
        match &err {
            SupervisorError::LaunchFailure { config, reason } => {
                assert_eq!(config, &conf());
                assert!(reason.contains("unknown directive"), "reason: {reason}");
            }
            other => panic!("expected LaunchFailure, got {other}"),
        }
        assert!(sup.registry_snapshot().await.is_empty());

        let log = stderr_log_path(&sup.settings.log_dir, &conf());
        let logged = fs::read_to_string(log).expect("stderr log");
        assert!(logged.contains("unknown directive"));
    }

    #[tokio::test]
    async fn failure_reason_only_covers_the_latest_launch() {
        let home = TempDir::new().expect("home");
        let settings = settings_with_script(&home, "echo 'second attempt' >&2\nexit 1\n");
        let log = stderr_log_path(&settings.log_dir, &conf());
        fs::create_dir_all(&settings.log_dir).expect("log dir");
        fs::write(&log, "first attempt\n").expect("seed log");
        let sup = supervisor(settings, FakeProcessTable::default());

        let err = sup.launch(Some(&conf())).await.unwrap_err();
        let reason = err.to_string();
        assert!(reason.contains("second attempt"), "reason: {reason}");
        assert!(!reason.contains("first attempt"), "reason: {reason}");
        assert_eq!(
            fs::read_to_string(&log).expect("log"),
            "first attempt\nsecond attempt\n"
        );
    }

    #[test]
    fn stderr_log_names_flatten_separators() {
        let dir = Path::new("/state/logs");
        assert_eq!(
            stderr_log_path(dir, &ConfigId::from("custom_web.conf")),
            PathBuf::from("/state/logs/custom_web.conf.stderr")
        );
        assert_eq!(
            stderr_log_path(dir, &ConfigId::from("sites/custom_web.conf")),
            PathBuf::from("/state/logs/sites_custom_web.conf.stderr")
        );
    }

    #[tokio::test]
    async fn nothing_discovered_is_a_launch_failure() {
        let home = TempDir::new().expect("home");
        let sup = supervisor(settings_with_script(&home, "exit 0\n"), FakeProcessTable::default());
        let err = sup.launch(Some(&conf())).await.unwrap_err();
        assert!(matches!(err, SupervisorError::LaunchFailure { .. }), "got: {err}");
    }

    #[tokio::test]
    async fn missing_binary_is_a_launch_failure() {
        let home = TempDir::new().expect("home");
        let mut settings = settings_with_script(&home, "exit 0\n");
        settings.binary = home.path().join("no-such-nginx");
        let sup = supervisor(settings, FakeProcessTable::default());
        let err = sup.launch(Some(&conf())).await.unwrap_err();
        assert!(matches!(err, SupervisorError::LaunchFailure { .. }), "got: {err}");
    }

    #[tokio::test]
    async fn hung_start_times_out() {
        let home = TempDir::new().expect("home");
        let mut settings = settings_with_script(&home, "exec sleep 5\n");
        settings.settle_delay = Duration::from_millis(500);
        settings.launch_timeout = Duration::from_millis(50);
        let sup = supervisor(settings, FakeProcessTable::default());

        let err = sup.launch(Some(&conf())).await.unwrap_err();
        match err {
            SupervisorError::LaunchFailure { reason, .. } => assert!(reason.contains("within")),
            other => panic!("expected LaunchFailure, got {other}"),
        }
        assert!(sup.registry_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn running_child_is_the_primary() {
        let home = TempDir::new().expect("home");
        let settings = settings_with_script(&home, "exec sleep 30\n");
        let table = FakeProcessTable::with_live(&[(700, "nginx")]);
        let sup = supervisor(settings, table);

        let result = sup.launch(Some(&conf())).await.expect("launch");
        assert_ne!(result.primary, ProcessId(700));
        assert_eq!(result.secondaries, vec![ProcessId(700)]);
        let snapshot = sup.registry_snapshot().await;
        assert_eq!(snapshot[&result.primary].role, Role::Primary);

        SystemProcessTable::new().terminate(result.primary).expect("cleanup child");
    }

    #[tokio::test]
    async fn late_stderr_output_keeps_the_server_alive() {
        let home = TempDir::new().expect("home");
        let script = "sleep 1\necho 'worker ready' >&2\nexec sleep 30\n";
        let sup = supervisor(settings_with_script(&home, script), FakeProcessTable::default());

        let result = sup.launch(Some(&conf())).await.expect("launch");
        assert_eq!(result.stderr_log, stderr_log_path(&sup.settings.log_dir, &conf()));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let table = SystemProcessTable::new();
        assert!(table.probe(result.primary).is_some(), "server died after writing stderr");
        let logged = fs::read_to_string(&result.stderr_log).expect("stderr log");
        assert!(logged.contains("worker ready"));

        table.terminate(result.primary).expect("cleanup child");
    }

    #[tokio::test]
    async fn concurrent_launches_do_not_share_processes() {
        let home = TempDir::new().expect("home");
        let settings = settings_with_script(&home, "exit 0\n");
        fs::write(settings.config_dir.join("custom_b.conf"), "listen 8081;\n").expect("config");
        let table = FakeProcessTable::with_live(&[(500, "nginx"), (501, "nginx")]);
        let sup = supervisor(settings, table);
        let other = sup.clone();
        let conf_b = ConfigId::from("custom_b.conf");
        let conf_a = conf();

        let (a, b) = tokio::join!(sup.launch(Some(&conf_a)), other.launch(Some(&conf_b)));
        let launched: Vec<_> = [a, b].into_iter().filter_map(Result::ok).collect();
        assert_eq!(launched.len(), 1, "the second launch finds nothing untracked");

        let snapshot = sup.registry_snapshot().await;
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.values().all(|r| r.config == launched[0].config));
    }

    #[tokio::test]
    async fn validate_surfaces_binary_output() {
        let home = TempDir::new().expect("home");
        let script = concat!(
            "if [ \"$1\" = \"-t\" ]; then\n",
            "  echo 'nginx: configuration file test is successful' >&2\n",
            "  exit 0\n",
            "fi\n",
            "exit 1\n",
        );
        let sup = supervisor(settings_with_script(&home, script), FakeProcessTable::default());

        let report = sup.validate(Some(&conf())).await.expect("validate");
        assert!(report.success);
        assert!(report.diagnostics.contains("test is successful"));
    }

    #[tokio::test]
    async fn validate_failure_is_a_report_not_an_error() {
        let home = TempDir::new().expect("home");
        let script = "echo 'nginx: [emerg] unexpected \"}\"' >&2\nexit 1\n";
        let sup = supervisor(settings_with_script(&home, script), FakeProcessTable::default());

        let report = sup.validate(Some(&conf())).await.expect("validate");
        assert!(!report.success);
        assert!(report.diagnostics.contains("[emerg]"));
    }
}
