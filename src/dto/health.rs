use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Fixtures currently being polled.
    pub polling_fixtures: usize,
    /// Rooms with at least one live subscriber.
    pub active_rooms: usize,
}

impl HealthResponse {
    /// Build the response from the degraded flag and the live counters.
    pub fn new(degraded: bool, polling_fixtures: usize, active_rooms: usize) -> Self {
        Self {
            status: if degraded { "degraded" } else { "ok" }.to_string(),
            polling_fixtures,
            active_rooms,
        }
    }
}
