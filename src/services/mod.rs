/// Account signup, login and sessions.
pub mod auth_service;
/// Projection of arena events onto wire messages and their fan-out.
pub mod broadcast;
/// Shared chat channel operations.
pub mod chat_service;
/// Password hashing.
pub mod credentials;
/// OpenAPI documentation generation.
pub mod documentation;
/// Match operations under the single-writer arena lock.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// Write-behind worker for durable operations.
pub mod persistence;
/// Storage connection supervisor and degraded mode.
pub mod storage_supervisor;
/// WebSocket connection and message handling service.
pub mod websocket_service;
