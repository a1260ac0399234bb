use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::with_monitor_routes;
use crate::scheduler::{build_monitor, run_periodic};
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use flat_scout::config::AppConfig;
use flat_scout::error::AppError;
use flat_scout::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let monitor = Arc::new(build_monitor(&config.monitor, &args.store)?);
    let scheduler = tokio::spawn(run_periodic(monitor.clone(), config.monitor.clone()));

    let app = with_monitor_routes(monitor, config.webapp.verifier())
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "listing monitor ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.abort();
    info!("listing monitor stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
