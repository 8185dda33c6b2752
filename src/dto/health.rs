use serde::Serialize;
use utoipa::ToSchema;

/// Payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema, PartialEq, Eq)]
pub struct HealthResponse {
    /// "ok" when a store answers, "degraded" otherwise.
    pub status: String,
    /// Live WebSocket connections.
    pub connections: usize,
}

impl HealthResponse {
    pub fn ok(connections: usize) -> Self {
        Self {
            status: "ok".to_owned(),
            connections,
        }
    }

    pub fn degraded(connections: usize) -> Self {
        Self {
            status: "degraded".to_owned(),
            connections,
        }
    }
}
