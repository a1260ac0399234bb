use std::sync::Arc;

use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use super::auth::{InitDataVerifier, SignedUser};
use super::domain::{UserFilter, UserId};
use super::notifier::Notifier;
use super::repository::{DeliveryTracker, FilterRepository, RepositoryError};
use super::service::MonitoringService;

/// State shared by the filter routes.
pub struct FilterApi<S, N> {
    service: Arc<MonitoringService<S, N>>,
    verifier: Arc<InitDataVerifier>,
}

impl<S, N> Clone for FilterApi<S, N> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            verifier: Arc::clone(&self.verifier),
        }
    }
}

impl<S, N> FromRef<FilterApi<S, N>> for Arc<MonitoringService<S, N>> {
    fn from_ref(api: &FilterApi<S, N>) -> Self {
        Arc::clone(&api.service)
    }
}

impl<S, N> FromRef<FilterApi<S, N>> for Arc<InitDataVerifier> {
    fn from_ref(api: &FilterApi<S, N>) -> Self {
        Arc::clone(&api.verifier)
    }
}

/// HTTP surface for the filter-edit flow. Every route requires signed init data
/// belonging to the user named in the path.
pub fn filter_router<S, N>(
    service: Arc<MonitoringService<S, N>>,
    verifier: InitDataVerifier,
) -> Router
where
    S: FilterRepository + DeliveryTracker + 'static,
    N: Notifier + 'static,
{
    let api = FilterApi {
        service,
        verifier: Arc::new(verifier),
    };

    Router::new()
        .route(
            "/api/v1/filters/:user_id",
            get(fetch_handler::<S, N>).put(upsert_handler::<S, N>),
        )
        .route(
            "/api/v1/filters/:user_id/activate",
            post(activate_handler::<S, N>),
        )
        .route(
            "/api/v1/filters/:user_id/deactivate",
            post(deactivate_handler::<S, N>),
        )
        .with_state(api)
}

#[derive(Debug, Serialize)]
struct FilterView {
    filter: UserFilter,
    summary: String,
}

impl From<UserFilter> for FilterView {
    fn from(filter: UserFilter) -> Self {
        let summary = filter.summary();
        Self { filter, summary }
    }
}

pub(crate) async fn fetch_handler<S, N>(
    State(service): State<Arc<MonitoringService<S, N>>>,
    SignedUser(caller): SignedUser,
    Path(user_id): Path<i64>,
) -> Response
where
    S: FilterRepository + DeliveryTracker + 'static,
    N: Notifier + 'static,
{
    if caller != UserId(user_id) {
        return forbidden(caller, user_id);
    }

    match service.store().fetch(UserId(user_id)) {
        Ok(Some(filter)) => (StatusCode::OK, Json(FilterView::from(filter))).into_response(),
        Ok(None) => not_found(user_id),
        Err(err) => internal_error(err),
    }
}

pub(crate) async fn upsert_handler<S, N>(
    State(service): State<Arc<MonitoringService<S, N>>>,
    SignedUser(caller): SignedUser,
    Path(user_id): Path<i64>,
    Json(mut filter): Json<UserFilter>,
) -> Response
where
    S: FilterRepository + DeliveryTracker + 'static,
    N: Notifier + 'static,
{
    if caller != UserId(user_id) {
        return forbidden(caller, user_id);
    }

    filter.user_id = UserId(user_id);
    filter.empty_notified_at = None;
    if let Err(error) = filter.validate() {
        let payload = json!({ "error": error.to_string() });
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response();
    }

    let store = service.store();
    let saved = store
        .upsert(filter.clone())
        .and_then(|()| store.clear_empty_notified(filter.user_id));
    match saved {
        Ok(()) => {
            info!(user_id, "filter updated");
            (StatusCode::OK, Json(FilterView::from(filter))).into_response()
        }
        Err(err) => internal_error(err),
    }
}

pub(crate) async fn activate_handler<S, N>(
    State(service): State<Arc<MonitoringService<S, N>>>,
    SignedUser(caller): SignedUser,
    Path(user_id): Path<i64>,
) -> Response
where
    S: FilterRepository + DeliveryTracker + 'static,
    N: Notifier + 'static,
{
    if caller != UserId(user_id) {
        return forbidden(caller, user_id);
    }

    let user = UserId(user_id);
    let filter = match service
        .store()
        .set_active(user, true)
        .and_then(|()| service.store().fetch(user))
    {
        Ok(Some(filter)) => filter,
        Ok(None) | Err(RepositoryError::NotFound) => return not_found(user_id),
        Err(err) => return internal_error(err),
    };

    let initial_batch = filter.initial_listings_count > 0;
    if initial_batch {
        let service = Arc::clone(&service);
        let batch_filter = filter.clone();
        tokio::spawn(async move {
            if let Err(err) = service.send_initial_listings(&batch_filter).await {
                warn!(user_id = %batch_filter.user_id, error = %err, "initial batch failed");
            }
        });
    }

    info!(user_id, initial_batch, "monitoring activated");
    let payload = json!({
        "user_id": user_id,
        "is_active": true,
        "initial_batch_scheduled": initial_batch,
    });
    (StatusCode::OK, Json(payload)).into_response()
}

pub(crate) async fn deactivate_handler<S, N>(
    State(service): State<Arc<MonitoringService<S, N>>>,
    SignedUser(caller): SignedUser,
    Path(user_id): Path<i64>,
) -> Response
where
    S: FilterRepository + DeliveryTracker + 'static,
    N: Notifier + 'static,
{
    if caller != UserId(user_id) {
        return forbidden(caller, user_id);
    }

    match service.store().set_active(UserId(user_id), false) {
        Ok(()) => {
            info!(user_id, "monitoring paused");
            let payload = json!({ "user_id": user_id, "is_active": false });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(RepositoryError::NotFound) => not_found(user_id),
        Err(err) => internal_error(err),
    }
}

fn not_found(user_id: i64) -> Response {
    let payload = json!({
        "error": "filter not found",
        "user_id": user_id,
    });
    (StatusCode::NOT_FOUND, Json(payload)).into_response()
}

fn forbidden(caller: UserId, user_id: i64) -> Response {
    warn!(%caller, user_id, "init data signed for another user");
    let payload = json!({ "error": "init data does not belong to this user" });
    (StatusCode::FORBIDDEN, Json(payload)).into_response()
}

fn internal_error(err: RepositoryError) -> Response {
    warn!(error = %err, "filter storage failed");
    let payload = json!({ "error": err.to_string() });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
}
