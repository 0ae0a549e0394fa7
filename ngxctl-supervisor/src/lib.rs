//! Process supervision for nginx instances: launch, liveness reconciliation,
//! termination and periodic monitoring, all recorded in the PID registry.

mod error;
pub mod launcher;
pub mod monitor;
pub mod os;
pub mod reconciler;
pub mod settings;
mod supervisor;
pub mod terminator;

pub use error::SupervisorError;
pub use launcher::{LaunchResult, ValidationReport};
pub use monitor::{MonitorHandle, MonitorReport};
pub use os::{ProcessStats, ProcessTable, SignalOutcome, SystemProcessTable};
pub use reconciler::{LiveInstance, ReconciliationReport};
pub use settings::Settings;
pub use supervisor::{init_tracing, Supervisor};
pub use terminator::{SignalFailure, StopResult};
