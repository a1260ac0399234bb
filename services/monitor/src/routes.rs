use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use flat_scout::workflows::monitoring::{
    filter_router, DeliveryTracker, FilterRepository, InitDataVerifier, MonitoringService,
    Notifier,
};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// Mounts the filter API only when init data can be verified.
pub(crate) fn with_monitor_routes<S, N>(
    service: Arc<MonitoringService<S, N>>,
    verifier: Option<InitDataVerifier>,
) -> axum::Router
where
    S: FilterRepository + DeliveryTracker + 'static,
    N: Notifier + 'static,
{
    let router = match verifier {
        Some(verifier) => filter_router(service, verifier),
        None => {
            warn!("BOT_TOKEN is not set, filter API disabled");
            axum::Router::new()
        }
    };

    router
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
