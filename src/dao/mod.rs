/// Persistence backends for users, stats, moves and chat.
pub mod arena_store;
/// Database model definitions.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
