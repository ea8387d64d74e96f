use std::sync::Arc;

use anyhow::{Context, Result};
use skycast_core::{AppError, Config};
use skycast_store::ForecastStore;
use skycast_sync::{
    BootstrapOutcome, JobSpec, LogNotifier, SyncContext, SyncService, TokioJobScheduler,
};
use skycast_weather::{SystemClock, WeatherProvider};

#[tokio::main]
async fn main() -> Result<()> {
    skycast_core::init()?;

    if let Err(e) = run().await {
        let err = AppError::from_anyhow(e);
        tracing::error!("Skycast stopped: {}", err);
        eprintln!("{}", err.user_message());
        return Err(err.into());
    }

    Ok(())
}

async fn run() -> Result<()> {
    let (config, _warnings) = Config::load_validated()?;

    std::fs::create_dir_all(&config.config_dir).with_context(|| {
        format!(
            "Failed to create config directory {}",
            config.config_dir.display()
        )
    })?;
    let store = Arc::new(ForecastStore::open(config.database_path())?);
    let provider = WeatherProvider::from_config(&config.weather, &config.sync)?;

    let sync = Arc::new(SyncService::new(
        provider,
        store,
        config.weather.clone(),
        Arc::new(SystemClock),
        Arc::new(LogNotifier),
    ));
    let scheduler = Arc::new(TokioJobScheduler::new(tokio::runtime::Handle::current()));
    let context = SyncContext::new(
        sync,
        scheduler.clone(),
        JobSpec::periodic_sync(&config.sync),
        tokio::runtime::Handle::current(),
    );

    tracing::info!("Skycast started for {}", config.weather.location);

    if let Some(seed) = context.initialize_once() {
        if let BootstrapOutcome::Synced(Err(e)) = seed.await? {
            eprintln!("{}", e.user_message());
        }
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    scheduler.shutdown();

    Ok(())
}
