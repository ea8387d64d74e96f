//! Forecast sync orchestration for Skycast.
//!
//! `SyncService` runs the fetch/parse/store cycle, `TokioJobScheduler` runs it
//! periodically, and `SyncContext` ties both together with a one-time bootstrap.

pub mod context;
pub mod notify;
pub mod scheduler;
pub mod sync;

pub use context::{BootstrapOutcome, SyncContext};
pub use notify::{ForecastNotification, LogNotifier, NotificationGate, Notifier};
pub use scheduler::{
    ConnectivityProbe, JobCallback, JobFuture, JobScheduler, JobSpec, SchedulerError,
    TokioJobScheduler, SYNC_JOB_TAG,
};
pub use sync::{SyncError, SyncReport, SyncResult, SyncService};
