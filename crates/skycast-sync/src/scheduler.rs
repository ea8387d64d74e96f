//! Recurring job registration.
//!
//! `JobScheduler` is the seam to whatever facility runs periodic work. The
//! in-process `TokioJobScheduler` runs jobs on the tokio runtime; it does not
//! survive a restart, so callers re-register at startup and rely on
//! replace-current semantics to avoid duplicates.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use skycast_core::SyncConfig;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Tag of the periodic forecast sync job.
pub const SYNC_JOB_TAG: &str = "skycast-sync";

/// How often a deferred job re-checks connectivity.
const CONNECTIVITY_POLL: Duration = Duration::from_secs(30);

pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Job body. The token is cancelled when the scheduler wants the run to stop.
pub type JobCallback = Arc<dyn Fn(CancellationToken) -> JobFuture + Send + Sync>;

/// Reports whether the network is currently usable.
pub type ConnectivityProbe = Arc<dyn Fn() -> bool + Send + Sync>;

/// Registration parameters for a recurring job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub tag: String,
    /// Earliest start after the previous run
    pub window_start: Duration,
    /// Latest start after the previous run
    pub window_end: Duration,
    pub requires_network: bool,
    /// Ask the facility to keep the job across restarts
    pub persistent: bool,
    /// Replace an existing registration with the same tag
    pub replace_current: bool,
}

impl JobSpec {
    /// The periodic forecast sync: every `interval` with `flex` slack.
    pub fn periodic_sync(sync: &SyncConfig) -> Self {
        Self {
            tag: SYNC_JOB_TAG.to_string(),
            window_start: Duration::from_secs(sync.interval_secs),
            window_end: Duration::from_secs(sync.interval_secs + sync.flex_secs),
            requires_network: sync.require_network,
            persistent: true,
            replace_current: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("A job tagged {0} is already scheduled")]
    AlreadyScheduled(String),

    #[error("Invalid execution window: {0}")]
    InvalidWindow(String),
}

pub trait JobScheduler: Send + Sync {
    /// Register `job` under `spec.tag`.
    fn schedule(&self, spec: JobSpec, job: JobCallback) -> Result<(), SchedulerError>;

    /// Stop and forget the job with `tag`. Returns false if none was registered.
    fn cancel(&self, tag: &str) -> bool;
}

/// Runs recurring jobs as tokio tasks.
pub struct TokioJobScheduler {
    runtime: tokio::runtime::Handle,
    jobs: Mutex<HashMap<String, CancellationToken>>,
    connectivity: ConnectivityProbe,
}

impl TokioJobScheduler {
    pub fn new(runtime: tokio::runtime::Handle) -> Self {
        Self {
            runtime,
            jobs: Mutex::new(HashMap::new()),
            connectivity: Arc::new(|| true),
        }
    }

    pub fn with_connectivity_probe(mut self, probe: ConnectivityProbe) -> Self {
        self.connectivity = probe;
        self
    }

    pub fn is_scheduled(&self, tag: &str) -> bool {
        self.jobs.lock().contains_key(tag)
    }

    /// Stop every job.
    pub fn shutdown(&self) {
        let jobs: Vec<(String, CancellationToken)> = self.jobs.lock().drain().collect();
        for (tag, token) in jobs {
            tracing::debug!("Stopping job {}", tag);
            token.cancel();
        }
    }
}

impl JobScheduler for TokioJobScheduler {
    fn schedule(&self, spec: JobSpec, job: JobCallback) -> Result<(), SchedulerError> {
        if spec.window_start.is_zero() || spec.window_end < spec.window_start {
            return Err(SchedulerError::InvalidWindow(format!(
                "{:?}..{:?}",
                spec.window_start, spec.window_end
            )));
        }

        let token = CancellationToken::new();
        {
            let mut jobs = self.jobs.lock();
            if let Some(existing) = jobs.get(&spec.tag) {
                if !spec.replace_current {
                    return Err(SchedulerError::AlreadyScheduled(spec.tag));
                }
                tracing::info!("Replacing scheduled job {}", spec.tag);
                existing.cancel();
            }
            jobs.insert(spec.tag.clone(), token.clone());
        }

        tracing::info!(
            "Scheduled job {} every {:?}..{:?} (network required: {})",
            spec.tag,
            spec.window_start,
            spec.window_end,
            spec.requires_network
        );

        let connectivity = Arc::clone(&self.connectivity);
        self.runtime.spawn(run_recurring(spec, job, token, connectivity));
        Ok(())
    }

    fn cancel(&self, tag: &str) -> bool {
        match self.jobs.lock().remove(tag) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

async fn run_recurring(
    spec: JobSpec,
    job: JobCallback,
    token: CancellationToken,
    connectivity: ConnectivityProbe,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(spec.window_start) => {}
        }

        if spec.requires_network && !wait_for_network(&spec, &connectivity, &token).await {
            if token.is_cancelled() {
                break;
            }
            tracing::warn!(
                "Skipping job {}: network unavailable for the whole window",
                spec.tag
            );
            continue;
        }

        tracing::debug!("Running job {}", spec.tag);
        job(token.child_token()).await;
    }
    tracing::debug!("Job {} stopped", spec.tag);
}

/// Hold a due job until the network is up, at most until the window closes.
///
/// Returns true once the probe reports online.
async fn wait_for_network(
    spec: &JobSpec,
    connectivity: &ConnectivityProbe,
    token: &CancellationToken,
) -> bool {
    let flex = spec.window_end.saturating_sub(spec.window_start);
    let deadline = tokio::time::Instant::now() + flex;
    loop {
        if connectivity() {
            return true;
        }

        let now = tokio::time::Instant::now();
        if now >= deadline {
            return false;
        }

        tracing::debug!("Deferring job {}: network unavailable", spec.tag);
        let pause = CONNECTIVITY_POLL.min(deadline - now);
        tokio::select! {
            _ = token.cancelled() => return false,
            _ = tokio::time::sleep(pause) => {}
        }
    }
}
