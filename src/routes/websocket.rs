use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    error::AppError,
    routes::auth::session_token,
    services::{auth_service, websocket_service},
    state::SharedState,
};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
/// Alternative to the session cookie for clients that cannot set one.
pub struct WsQuery {
    /// Session token returned by `/login` or `/signup`.
    pub token: Option<String>,
}

#[utoipa::path(
    get,
    path = "/ws",
    tag = "game",
    params(WsQuery),
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 401, description = "No session resolved for the request")
    )
)]
/// Upgrade an authenticated HTTP request into a game WebSocket session.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let token = session_token(&headers)
        .or(query.token)
        .ok_or_else(|| AppError::Unauthorized("missing session".into()))?;
    let username = auth_service::identify(&state, &token)?;

    let shared_state = state.clone();
    Ok(ws.on_upgrade(move |socket| {
        websocket_service::handle_socket(shared_state, socket, username)
    }))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws", get(ws_handler))
}
