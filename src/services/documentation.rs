use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the live match companion.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::fixtures::fixture_access,
        crate::routes::fixtures::fixture_snapshot,
        crate::routes::fixtures::start_watch,
        crate::routes::fixtures::stop_watch,
        crate::routes::rooms::list_messages,
        crate::routes::rooms::send_message,
        crate::routes::rooms::toggle_reaction,
        crate::routes::rooms::tap_message,
        crate::routes::rooms::presence,
        crate::routes::rooms::join_room,
        crate::routes::rooms::leave_room,
        crate::routes::sse::fixture_stream,
        crate::routes::sse::room_stream,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::fixture::AccessResponse,
            crate::dto::fixture::SnapshotResponse,
            crate::dto::fixture::SyncStateEvent,
            crate::dto::fixture::WatchResponse,
            crate::dto::chat::MessageDto,
            crate::dto::chat::SendMessageRequest,
            crate::dto::chat::ReactionRequest,
            crate::dto::chat::TapRequest,
            crate::dto::chat::TapResponse,
            crate::dto::presence::JoinRequest,
            crate::dto::presence::PresenceCount,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "fixtures", description = "Fixture access, snapshots and polling"),
        (name = "rooms", description = "Match chat rooms and presence"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;
