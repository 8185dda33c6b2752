use std::sync::Arc;

use futures::future::BoxFuture;
use indexmap::IndexMap;
use tokio::sync::RwLock;

use crate::dao::{
    arena_store::ArenaStore,
    models::{ChatEntryEntity, PlacementEntity, UserEntity},
    storage::StorageResult,
};
use crate::state::arena::StatsRecord;

/// Process-local store used when no database is configured, and by tests.
#[derive(Clone, Default)]
pub struct MemoryArenaStore {
    inner: Arc<RwLock<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    users: IndexMap<String, UserEntity>,
    placements: Vec<PlacementEntity>,
    chat: Vec<ChatEntryEntity>,
}

impl MemoryArenaStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn bump(&self, username: String, wins: i64, losses: i64) {
        let mut guard = self.inner.write().await;
        if let Some(user) = guard.users.get_mut(&username) {
            user.wins += wins;
            user.losses += losses;
        }
    }
}

impl ArenaStore for MemoryArenaStore {
    fn find_user(&self, username: String) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.read().await.users.get(&username).cloned()) })
    }

    fn create_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let mut guard = store.inner.write().await;
            if guard.users.contains_key(&user.username) {
                return Ok(false);
            }
            guard.users.insert(user.username.clone(), user);
            Ok(true)
        })
    }

    fn increment_wins(&self, username: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.bump(username, 1, 0).await;
            Ok(())
        })
    }

    fn increment_losses(&self, username: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.bump(username, 0, 1).await;
            Ok(())
        })
    }

    fn fetch_stats(&self, username: String) -> BoxFuture<'static, StorageResult<Option<StatsRecord>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .inner
                .read()
                .await
                .users
                .get(&username)
                .map(UserEntity::stats))
        })
    }

    fn append_placement(&self, placement: PlacementEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.write().await.placements.push(placement);
            Ok(())
        })
    }

    fn fetch_placements(&self) -> BoxFuture<'static, StorageResult<Vec<PlacementEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.read().await.placements.clone()) })
    }

    fn clear_placements(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.write().await.placements.clear();
            Ok(())
        })
    }

    fn append_chat(&self, entry: ChatEntryEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.write().await.chat.push(entry);
            Ok(())
        })
    }

    fn fetch_chat(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<ChatEntryEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let guard = store.inner.read().await;
            let skip = guard.chat.len().saturating_sub(limit);
            Ok(guard.chat.iter().skip(skip).cloned().collect())
        })
    }

    fn clear_chat(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.write().await.chat.clear();
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    #[tokio::test]
    async fn create_user_refuses_duplicates() {
        let store = MemoryArenaStore::new();
        let user = UserEntity::new("ana".into(), "hash".into());
        assert!(store.create_user(user.clone()).await.unwrap());
        assert!(!store.create_user(user).await.unwrap());
    }

    #[tokio::test]
    async fn increments_touch_only_the_named_counter() {
        let store = MemoryArenaStore::new();
        store
            .create_user(UserEntity::new("ana".into(), "hash".into()))
            .await
            .unwrap();
        store
            .create_user(UserEntity::new("bo".into(), "hash".into()))
            .await
            .unwrap();

        store.increment_wins("ana".into()).await.unwrap();
        store.increment_losses("bo".into()).await.unwrap();

        let ana = store.find_user("ana".into()).await.unwrap().unwrap();
        assert_eq!((ana.wins, ana.losses), (1, 0));
        assert_eq!(
            store.fetch_stats("bo".into()).await.unwrap(),
            Some(StatsRecord { wins: 0, losses: 1 })
        );
        assert_eq!(store.fetch_stats("ghost".into()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn fetch_chat_returns_newest_entries_oldest_first() {
        let store = MemoryArenaStore::new();
        for text in ["one", "two", "three"] {
            store
                .append_chat(ChatEntryEntity {
                    username: "ana".into(),
                    text: text.into(),
                    created_at: SystemTime::UNIX_EPOCH,
                })
                .await
                .unwrap();
        }
        let texts: Vec<_> = store
            .fetch_chat(2)
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.text)
            .collect();
        assert_eq!(texts, vec!["two", "three"]);
    }

    #[tokio::test]
    async fn move_log_is_kept_in_order_and_cleared() {
        let store = MemoryArenaStore::new();
        for position in [5, 1] {
            store
                .append_placement(PlacementEntity {
                    position,
                    symbol: "x".into(),
                })
                .await
                .unwrap();
        }
        let positions: Vec<_> = store
            .fetch_placements()
            .await
            .unwrap()
            .into_iter()
            .map(|placement| placement.position)
            .collect();
        assert_eq!(positions, vec![5, 1]);

        store.clear_placements().await.unwrap();
        assert!(store.fetch_placements().await.unwrap().is_empty());
    }
}
