use axum::Router;

use crate::state::SharedState;

pub mod auth;
pub mod docs;
pub mod health;
pub mod websocket;

/// Compose the health, account, WebSocket and documentation routes over shared state.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(auth::router())
        .merge(websocket::router())
        .merge(docs::router())
        .with_state(state)
}
