use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};

use crate::{
    dto::fixture::{AccessResponse, SnapshotResponse, WatchResponse},
    error::AppError,
    services::{access_service, sync_service::parse_fixture_id},
    state::SharedState,
};

/// Routes exposing fixture data and polling control.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/fixtures/{id}/access", get(fixture_access))
        .route("/fixtures/{id}/snapshot", get(fixture_snapshot))
        .route("/fixtures/{id}/watch", post(start_watch).delete(stop_watch))
}

/// Chat access window of a fixture and where its chat entry should lead.
#[utoipa::path(
    get,
    path = "/fixtures/{id}/access",
    tag = "fixtures",
    params(("id" = String, Path, description = "Provider fixture id")),
    responses(
        (status = 200, description = "Access window", body = AccessResponse),
        (status = 400, description = "Invalid fixture id"),
        (status = 404, description = "Unknown fixture"),
        (status = 502, description = "Provider failure"),
        (status = 504, description = "Provider timeout")
    )
)]
pub async fn fixture_access(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<AccessResponse>, AppError> {
    let access = access_service::evaluate(&state, &id).await?;
    Ok(Json(access.into()))
}

/// Fetch a complete snapshot once, through the cache.
#[utoipa::path(
    get,
    path = "/fixtures/{id}/snapshot",
    tag = "fixtures",
    params(("id" = String, Path, description = "Provider fixture id")),
    responses(
        (status = 200, description = "Match snapshot", body = SnapshotResponse),
        (status = 400, description = "Invalid fixture id"),
        (status = 404, description = "Unknown fixture"),
        (status = 502, description = "Provider failure"),
        (status = 504, description = "Provider timeout")
    )
)]
pub async fn fixture_snapshot(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<SnapshotResponse>, AppError> {
    let snapshot = state.synchronizer().fetch_snapshot(&id).await?;
    Ok(Json(SnapshotResponse::from(&snapshot)))
}

/// Start background polling of a fixture.
#[utoipa::path(
    post,
    path = "/fixtures/{id}/watch",
    tag = "fixtures",
    params(("id" = String, Path, description = "Provider fixture id")),
    responses(
        (status = 200, description = "Polling started", body = WatchResponse),
        (status = 400, description = "Invalid fixture id")
    )
)]
pub async fn start_watch(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<WatchResponse>, AppError> {
    let fixture_id = parse_fixture_id(&id)?;
    state.synchronizer().start_polling(fixture_id);
    Ok(Json(WatchResponse {
        fixture_id,
        polling: true,
    }))
}

/// Stop background polling of a fixture.
#[utoipa::path(
    delete,
    path = "/fixtures/{id}/watch",
    tag = "fixtures",
    params(("id" = String, Path, description = "Provider fixture id")),
    responses(
        (status = 200, description = "Polling stopped", body = WatchResponse),
        (status = 400, description = "Invalid fixture id")
    )
)]
pub async fn stop_watch(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<WatchResponse>, AppError> {
    let fixture_id = parse_fixture_id(&id)?;
    state.synchronizer().stop_polling(fixture_id);
    Ok(Json(WatchResponse {
        fixture_id,
        polling: state.synchronizer().is_polling(fixture_id),
    }))
}
