use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report degraded mode and live counters while logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.store().require().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "chat store health check failed");
            }
        }
        Err(_) => warn!("chat store unavailable (degraded mode)"),
    }

    HealthResponse::new(
        state.is_degraded(),
        state.synchronizer().polling_count(),
        state.chat().active_rooms(),
    )
}
