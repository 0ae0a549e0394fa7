//! Periodic reconciliation on a background task.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::{join_err, SupervisorError};
use crate::os::ProcessTable;
use crate::reconciler::ReconciliationReport;
use crate::supervisor::Supervisor;

const REPORT_BUFFER: usize = 8;

pub type MonitorReport = Result<ReconciliationReport, SupervisorError>;

/// Owns the recurring reconciliation task. Dropping it aborts the task.
pub struct MonitorHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Ask the task to finish its current pass and wait for it to exit.
    pub async fn stop(mut self) -> Result<(), SupervisorError> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        match self.task.take() {
            Some(task) => task.await.map_err(|err| join_err("monitor", err)),
            None => Ok(()),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl<P: ProcessTable> Supervisor<P> {
    /// Reconcile now and then every `interval` until stopped.
    ///
    /// Each pass is delivered on the returned receiver; dropping the receiver
    /// also ends the task. Ticks missed while a pass runs are skipped.
    pub fn start_monitoring(
        &self,
        interval: Duration,
    ) -> (MonitorHandle, mpsc::Receiver<MonitorReport>) {
        let (report_tx, report_rx) = mpsc::channel(REPORT_BUFFER);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let supervisor = self.clone();
        let task = tokio::spawn(monitor_task(supervisor, interval, report_tx, shutdown_rx));
        let handle = MonitorHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        };
        (handle, report_rx)
    }
}

async fn monitor_task<P: ProcessTable>(
    supervisor: Supervisor<P>,
    interval: Duration,
    report_tx: mpsc::Sender<MonitorReport>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::info!(interval_ms = interval.as_millis() as u64, "monitor started");

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            _ = ticker.tick() => {
                let report = supervisor.reconcile().await;
                match &report {
                    Ok(report) if !report.pruned.is_empty() => {
                        tracing::info!(
                            pruned = report.pruned.len(),
                            live = report.live.len(),
                            "monitor pass",
                        );
                    }
                    Ok(report) => tracing::debug!(live = report.live.len(), "monitor pass"),
                    Err(err) => tracing::warn!(error = %err, "monitor pass failed"),
                }
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    sent = report_tx.send(report) => {
                        if sent.is_err() {
                            tracing::debug!("monitor receiver dropped");
                            break;
                        }
                    }
                }
            }
        }
    }

    tracing::info!("monitor stopped");
}
