use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::{
        chat::{MessageDto, ReactionRequest, SendMessageRequest, TapRequest, TapResponse},
        presence::{JoinRequest, PresenceCount},
    },
    error::AppError,
    services::room_service,
    state::SharedState,
};

/// Routes of the per-fixture chat rooms. `{id}` is the fixture id; the room
/// key is derived from it.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms/{id}/messages", get(list_messages).post(send_message))
        .route(
            "/rooms/{id}/messages/{message_id}/reactions",
            post(toggle_reaction),
        )
        .route("/rooms/{id}/messages/{message_id}/taps", post(tap_message))
        .route("/rooms/{id}/presence", get(presence).post(join_room))
        .route("/rooms/{id}/presence/{client_id}", delete(leave_room))
}

#[utoipa::path(
    get,
    path = "/rooms/{id}/messages",
    tag = "rooms",
    params(("id" = String, Path, description = "Provider fixture id")),
    responses(
        (status = 200, description = "Room messages, oldest first", body = [MessageDto]),
        (status = 503, description = "Chat store unavailable")
    )
)]
/// List the messages of a fixture's room.
pub async fn list_messages(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<MessageDto>>, AppError> {
    Ok(Json(room_service::list_messages(&state, &id).await?))
}

#[utoipa::path(
    post,
    path = "/rooms/{id}/messages",
    tag = "rooms",
    params(("id" = String, Path, description = "Provider fixture id")),
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "Message stored", body = MessageDto),
        (status = 400, description = "Invalid message"),
        (status = 404, description = "Reply target not found"),
        (status = 409, description = "Room is not open"),
        (status = 503, description = "Chat store unavailable")
    )
)]
/// Post a message in an open room.
pub async fn send_message(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Valid(Json(payload)): Valid<Json<SendMessageRequest>>,
) -> Result<Json<MessageDto>, AppError> {
    Ok(Json(room_service::send_message(&state, &id, payload).await?))
}

#[utoipa::path(
    post,
    path = "/rooms/{id}/messages/{message_id}/reactions",
    tag = "rooms",
    params(
        ("id" = String, Path, description = "Provider fixture id"),
        ("message_id" = Uuid, Path, description = "Target message")
    ),
    request_body = ReactionRequest,
    responses(
        (status = 200, description = "Reaction toggled", body = MessageDto),
        (status = 404, description = "Message not found"),
        (status = 409, description = "Room is not open or message is a system message")
    )
)]
/// Toggle the caller's reaction on a message.
pub async fn toggle_reaction(
    State(state): State<SharedState>,
    Path((id, message_id)): Path<(String, Uuid)>,
    Valid(Json(payload)): Valid<Json<ReactionRequest>>,
) -> Result<Json<MessageDto>, AppError> {
    Ok(Json(
        room_service::toggle_reaction(&state, &id, message_id, payload).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/rooms/{id}/messages/{message_id}/taps",
    tag = "rooms",
    params(
        ("id" = String, Path, description = "Provider fixture id"),
        ("message_id" = Uuid, Path, description = "Tapped message")
    ),
    request_body = TapRequest,
    responses(
        (status = 200, description = "Tap registered", body = TapResponse),
        (status = 409, description = "Room is not open")
    )
)]
/// Register a tap; a double tap toggles a heart reaction.
pub async fn tap_message(
    State(state): State<SharedState>,
    Path((id, message_id)): Path<(String, Uuid)>,
    Valid(Json(payload)): Valid<Json<TapRequest>>,
) -> Result<Json<TapResponse>, AppError> {
    Ok(Json(
        room_service::tap_message(&state, &id, message_id, payload).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/rooms/{id}/presence",
    tag = "rooms",
    params(("id" = String, Path, description = "Provider fixture id")),
    responses((status = 200, description = "Active viewers", body = PresenceCount))
)]
/// Count the active viewers of a room.
pub async fn presence(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<PresenceCount>, AppError> {
    Ok(Json(room_service::presence(&state, &id).await?))
}

#[utoipa::path(
    post,
    path = "/rooms/{id}/presence",
    tag = "rooms",
    params(("id" = String, Path, description = "Provider fixture id")),
    request_body = JoinRequest,
    responses(
        (status = 200, description = "Joined or refreshed", body = PresenceCount),
        (status = 409, description = "Room is not open")
    )
)]
/// Join a room or refresh presence; clients repeat this at least every two
/// minutes to stay counted.
pub async fn join_room(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Valid(Json(payload)): Valid<Json<JoinRequest>>,
) -> Result<Json<PresenceCount>, AppError> {
    Ok(Json(room_service::join(&state, &id, payload).await?))
}

#[utoipa::path(
    delete,
    path = "/rooms/{id}/presence/{client_id}",
    tag = "rooms",
    params(
        ("id" = String, Path, description = "Provider fixture id"),
        ("client_id" = String, Path, description = "Leaving client")
    ),
    responses((status = 200, description = "Left", body = PresenceCount))
)]
/// Leave a room.
pub async fn leave_room(
    State(state): State<SharedState>,
    Path((id, client_id)): Path<(String, String)>,
) -> Result<Json<PresenceCount>, AppError> {
    Ok(Json(room_service::leave(&state, &id, &client_id).await?))
}
