//! App-lifetime sync context: one-time bootstrap plus on-demand refresh.

use std::sync::{Arc, OnceLock};

use skycast_core::WeatherConfig;
use tokio::task::JoinHandle;

use crate::scheduler::{JobCallback, JobScheduler, JobSpec};
use crate::sync::{SyncResult, SyncService};

/// What the bootstrap seed did.
#[derive(Debug)]
pub enum BootstrapOutcome {
    /// The store already had a forecast for today
    AlreadyCurrent,
    /// The store was empty for today, so a sync ran
    Synced(SyncResult),
}

/// Owns the sync service and its periodic registration for the life of the app.
pub struct SyncContext {
    sync: Arc<SyncService>,
    scheduler: Arc<dyn JobScheduler>,
    job_spec: JobSpec,
    runtime: tokio::runtime::Handle,
    bootstrapped: OnceLock<()>,
}

impl SyncContext {
    pub fn new(
        sync: Arc<SyncService>,
        scheduler: Arc<dyn JobScheduler>,
        job_spec: JobSpec,
        runtime: tokio::runtime::Handle,
    ) -> Arc<Self> {
        Arc::new(Self {
            sync,
            scheduler,
            job_spec,
            runtime,
            bootstrapped: OnceLock::new(),
        })
    }

    pub fn sync(&self) -> &Arc<SyncService> {
        &self.sync
    }

    pub fn is_initialized(&self) -> bool {
        self.bootstrapped.get().is_some()
    }

    /// Register the periodic job and seed the store if today's forecast is missing.
    ///
    /// Only the first call in the context's lifetime does anything; later calls
    /// return `None` without touching the scheduler or the network.
    pub fn initialize_once(self: &Arc<Self>) -> Option<JoinHandle<BootstrapOutcome>> {
        let mut first = false;
        self.bootstrapped.get_or_init(|| first = true);
        if !first {
            tracing::debug!("Sync already initialized");
            return None;
        }

        if let Err(e) = self
            .scheduler
            .schedule(self.job_spec.clone(), self.periodic_job())
        {
            tracing::error!("Failed to schedule periodic sync: {}", e);
        }

        let sync = Arc::clone(&self.sync);
        Some(self.runtime.spawn(async move {
            let today = sync.today();
            match sync.store().has_data_from(today) {
                Ok(true) => {
                    tracing::info!("Forecast for today already stored");
                    BootstrapOutcome::AlreadyCurrent
                }
                Ok(false) => BootstrapOutcome::Synced(sync.sync_weather().await),
                Err(e) => {
                    tracing::warn!("Could not check stored forecast, syncing: {}", e);
                    BootstrapOutcome::Synced(sync.sync_weather().await)
                }
            }
        }))
    }

    /// Start an immediate sync off the calling thread.
    pub fn refresh(&self) -> JoinHandle<SyncResult> {
        let sync = Arc::clone(&self.sync);
        self.runtime.spawn(async move { sync.sync_weather().await })
    }

    /// Apply new preferences. A changed location triggers an immediate sync.
    pub fn update_preferences(&self, preferences: WeatherConfig) -> Option<JoinHandle<SyncResult>> {
        let previous = self.sync.set_preferences(preferences.clone());
        if previous.location_differs(&preferences) {
            tracing::info!("Location changed, refreshing forecast");
            Some(self.refresh())
        } else {
            None
        }
    }

    fn periodic_job(&self) -> JobCallback {
        let sync = Arc::clone(&self.sync);
        Arc::new(move |cancel| {
            let sync = Arc::clone(&sync);
            Box::pin(async move {
                match sync.sync_weather_with_cancel(&cancel).await {
                    Ok(_) => {}
                    Err(e) if e.is_transient() => {
                        tracing::debug!("Periodic sync will retry next window: {}", e);
                    }
                    Err(e) => {
                        tracing::warn!("Periodic sync needs attention: {}", e.user_message());
                    }
                }
            })
        })
    }
}
