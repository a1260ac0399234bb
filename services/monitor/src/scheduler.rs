use crate::cli::{PruneArgs, StoreArgs};
use crate::infra::{FixtureSource, LoggingNotifier, MonitorStore};
use chrono::Utc;
use flat_scout::config::{AppConfig, MonitorConfig};
use flat_scout::error::AppError;
use flat_scout::telemetry;
use flat_scout::workflows::monitoring::{
    CycleReport, DeliveryTracker, FilterRepository, MonitorError, MonitoringService, Notifier,
};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

pub(crate) type Monitor = MonitoringService<MonitorStore, LoggingNotifier>;

/// Runs a cycle every `config.interval`, starting immediately. Never returns.
pub(crate) async fn run_periodic<S, N>(service: Arc<MonitoringService<S, N>>, config: MonitorConfig)
where
    S: FilterRepository + DeliveryTracker + 'static,
    N: Notifier + 'static,
{
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_secs = config.interval.as_secs(), "monitor scheduled");

    loop {
        ticker.tick().await;
        if let Err(err) = run_once(&service, &config).await {
            error!(error = %err, "monitoring cycle failed");
        }
    }
}

/// Prunes expired delivery records, then runs one cycle. A failed prune does not
/// block the cycle.
pub(crate) async fn run_once<S, N>(
    service: &MonitoringService<S, N>,
    config: &MonitorConfig,
) -> Result<CycleReport, MonitorError>
where
    S: FilterRepository + DeliveryTracker + 'static,
    N: Notifier + 'static,
{
    if let Err(err) = service.prune_expired(config.retention_cutoff(Utc::now())) {
        warn!(error = %err, "pruning delivery records failed");
    }
    service.run_cycle().await
}

pub(crate) fn build_monitor(config: &MonitorConfig, args: &StoreArgs) -> Result<Monitor, AppError> {
    let db_path = args.db_path.as_deref().or(config.db_path.as_deref());
    let store = Arc::new(MonitorStore::open(db_path)?);
    let sources = FixtureSource::for_all_sources(args.listings.as_deref());
    Ok(MonitoringService::new(
        store,
        Arc::new(LoggingNotifier),
        sources,
        config.settings(),
    ))
}

pub(crate) async fn run_once_command(args: StoreArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let monitor = build_monitor(&config.monitor, &args)?;
    let report = run_once(&monitor, &config.monitor).await?;
    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(err) => println!("cycle report unavailable: {err}"),
    }
    Ok(())
}

pub(crate) fn prune_command(args: PruneArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    if let Some(days) = args.retention_days {
        config.monitor.retention_days = days;
    }

    let db_path = args.db_path.as_deref().or(config.monitor.db_path.as_deref());
    let store = MonitorStore::open(db_path)?;
    let removed = store.prune(config.monitor.retention_cutoff(Utc::now()))?;
    println!(
        "removed {removed} delivery records older than {} days",
        config.monitor.retention_days
    );
    Ok(())
}
