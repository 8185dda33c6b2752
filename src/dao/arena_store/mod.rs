pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{ChatEntryEntity, PlacementEntity, UserEntity};
use crate::dao::storage::StorageResult;
use crate::state::arena::StatsRecord;
use futures::future::BoxFuture;

/// Abstraction over the durable collaborators: credential/stats ledger, move log and
/// chat log.
pub trait ArenaStore: Send + Sync {
    fn find_user(&self, username: String) -> BoxFuture<'static, StorageResult<Option<UserEntity>>>;
    /// Insert a new account. Resolves to `false` when the username is taken.
    fn create_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<bool>>;
    fn increment_wins(&self, username: String) -> BoxFuture<'static, StorageResult<()>>;
    fn increment_losses(&self, username: String) -> BoxFuture<'static, StorageResult<()>>;
    /// Counters of an existing account.
    fn fetch_stats(&self, username: String) -> BoxFuture<'static, StorageResult<Option<StatsRecord>>>;
    fn append_placement(&self, placement: PlacementEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Move log in insertion order.
    fn fetch_placements(&self) -> BoxFuture<'static, StorageResult<Vec<PlacementEntity>>>;
    fn clear_placements(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn append_chat(&self, entry: ChatEntryEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Newest `limit` chat entries, oldest first.
    fn fetch_chat(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<ChatEntryEntity>>>;
    fn clear_chat(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
