use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Ping the store and report whether the backend runs degraded.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    let connections = state.connections().len();
    if state.is_degraded().await {
        HealthResponse::degraded(connections)
    } else {
        HealthResponse::ok(connections)
    }
}
