use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, Query, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use validator::Validate;

use crate::{
    dto::presence::RoomStreamQuery, error::AppError, services::sse_service, state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sse/fixtures/{id}",
    tag = "sse",
    params(("id" = String, Path, description = "Provider fixture id")),
    responses(
        (status = 200, description = "Sync state stream", content_type = "text/event-stream", body = String),
        (status = 400, description = "Invalid fixture id")
    )
)]
/// Stream snapshot updates of a fixture; polling runs while someone listens.
pub async fn fixture_stream(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    Ok(sse_service::fixture_stream(&state, &id)?)
}

#[utoipa::path(
    get,
    path = "/sse/rooms/{id}",
    tag = "sse",
    params(
        ("id" = String, Path, description = "Provider fixture id"),
        ("client_id" = Option<String>, Query, description = "Viewer counted while connected; needs `name`"),
        ("name" = Option<String>, Query, description = "Display name of the viewer")
    ),
    responses(
        (status = 200, description = "Room message and presence stream", content_type = "text/event-stream", body = String),
        (status = 400, description = "Invalid viewer identity"),
        (status = 409, description = "Room is not open"),
        (status = 503, description = "Chat store unavailable")
    )
)]
/// Stream the full message list of an open room plus its presence count.
pub async fn room_stream(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<RoomStreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let viewer = query.viewer();
    if let Some(viewer) = &viewer {
        viewer.validate()?;
    }
    Ok(sse_service::room_stream(&state, &id, viewer).await?)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sse/fixtures/{id}", get(fixture_stream))
        .route("/sse/rooms/{id}", get(room_stream))
}
