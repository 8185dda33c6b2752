use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the tic-tac-toe backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::auth::signup,
        crate::routes::auth::login,
        crate::routes::auth::logout,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::auth::CredentialsRequest,
            crate::dto::auth::SessionResponse,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::ServerMessage,
            crate::dto::ws::RejectReason,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Account and session management"),
        (name = "game", description = "WebSocket protocol for players and spectators"),
    )
)]
pub struct ApiDoc;
