use std::time::Duration;

use futures::future::BoxFuture;
use tokio::{
    sync::mpsc,
    time::{sleep, timeout},
};
use tracing::{info, warn};

use crate::{
    dao::{arena_store::ArenaStore, storage::StorageResult},
    state::{SharedState, arena::DurableOp},
};

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Apply queued durable writes one at a time, in commit order.
///
/// Failures are retried a bounded number of times, then logged and dropped: the
/// in-memory state has already been broadcast and stays authoritative.
pub async fn run(state: SharedState, mut queue: mpsc::UnboundedReceiver<DurableOp>) {
    while let Some(op) = queue.recv().await {
        apply_with_retry(&state, op).await;
    }
    info!("durable write queue closed; persistence worker stopping");
}

async fn apply_with_retry(state: &SharedState, op: DurableOp) {
    let config = state.config();
    let attempts = config.durable_retry_attempts();
    let mut delay = INITIAL_BACKOFF;

    for attempt in 1..=attempts {
        let Some(store) = state.store().await else {
            warn!(op = label(&op), "no storage backend (degraded mode); dropping durable write");
            return;
        };

        match timeout(config.durable_call_timeout(), dispatch(store.as_ref(), op.clone())).await {
            Ok(Ok(())) => return,
            Ok(Err(err)) if !err.is_transient() => {
                warn!(op = label(&op), error = %err, "durable write rejected; not retrying");
                return;
            }
            Ok(Err(err)) => {
                warn!(op = label(&op), attempt, error = %err, "durable write failed");
            }
            Err(_) => {
                warn!(op = label(&op), attempt, "durable write timed out");
            }
        }

        if attempt < attempts {
            sleep(delay).await;
            delay *= 2;
        }
    }

    warn!(op = ?op, attempts, "giving up on durable write");
}

fn dispatch(store: &dyn ArenaStore, op: DurableOp) -> BoxFuture<'static, StorageResult<()>> {
    match op {
        DurableOp::AppendPlacement(placement) => store.append_placement(placement.into()),
        DurableOp::ClearPlacements => store.clear_placements(),
        DurableOp::IncrementWins(username) => store.increment_wins(username),
        DurableOp::IncrementLosses(username) => store.increment_losses(username),
        DurableOp::AppendChat(entry) => store.append_chat(entry.into()),
        DurableOp::ClearChat => store.clear_chat(),
    }
}

fn label(op: &DurableOp) -> &'static str {
    match op {
        DurableOp::AppendPlacement(_) => "append_placement",
        DurableOp::ClearPlacements => "clear_placements",
        DurableOp::IncrementWins(_) => "increment_wins",
        DurableOp::IncrementLosses(_) => "increment_losses",
        DurableOp::AppendChat(_) => "append_chat",
        DurableOp::ClearChat => "clear_chat",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            arena_store::memory::MemoryArenaStore,
            models::{ChatEntryEntity, PlacementEntity, UserEntity},
            storage::StorageError,
        },
        state::{
            AppState,
            arena::StatsRecord,
            match_machine::{Placement, Position, Symbol},
        },
    };

    async fn drain(state: &SharedState, queue: &mut mpsc::UnboundedReceiver<DurableOp>) {
        while let Ok(op) = queue.try_recv() {
            apply_with_retry(state, op).await;
        }
    }

    #[derive(Default)]
    struct FailingStore {
        calls: AtomicU32,
        corrupt: bool,
    }

    impl FailingStore {
        fn fail<T: Send + 'static>(&self) -> BoxFuture<'static, StorageResult<T>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let corrupt = self.corrupt;
            Box::pin(async move {
                if corrupt {
                    return Err(StorageError::InvalidRecord("bad document".into()));
                }
                Err(StorageError::unavailable(
                    "test",
                    "store offline".into(),
                    std::io::Error::other("offline"),
                ))
            })
        }
    }

    impl ArenaStore for FailingStore {
        fn find_user(&self, _: String) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
            self.fail()
        }
        fn create_user(&self, _: UserEntity) -> BoxFuture<'static, StorageResult<bool>> {
            self.fail()
        }
        fn increment_wins(&self, _: String) -> BoxFuture<'static, StorageResult<()>> {
            self.fail()
        }
        fn increment_losses(&self, _: String) -> BoxFuture<'static, StorageResult<()>> {
            self.fail()
        }
        fn fetch_stats(&self, _: String) -> BoxFuture<'static, StorageResult<Option<StatsRecord>>> {
            self.fail()
        }
        fn append_placement(&self, _: PlacementEntity) -> BoxFuture<'static, StorageResult<()>> {
            self.fail()
        }
        fn fetch_placements(&self) -> BoxFuture<'static, StorageResult<Vec<PlacementEntity>>> {
            self.fail()
        }
        fn clear_placements(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.fail()
        }
        fn append_chat(&self, _: ChatEntryEntity) -> BoxFuture<'static, StorageResult<()>> {
            self.fail()
        }
        fn fetch_chat(&self, _: usize) -> BoxFuture<'static, StorageResult<Vec<ChatEntryEntity>>> {
            self.fail()
        }
        fn clear_chat(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.fail()
        }
        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.fail()
        }
        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.fail()
        }
    }

    #[tokio::test]
    async fn worker_applies_ops_in_order() {
        let (state, mut queue) = AppState::new(AppConfig::default());
        let store = MemoryArenaStore::new();
        store
            .create_user(UserEntity::new("ana".into(), "hash".into()))
            .await
            .unwrap();
        state.install_store(Arc::new(store.clone())).await;

        let placement = Placement {
            position: Position::new(7).unwrap(),
            symbol: Symbol::X,
        };
        state.enqueue_durable([
            DurableOp::AppendPlacement(placement),
            DurableOp::ClearPlacements,
            DurableOp::AppendPlacement(placement),
            DurableOp::IncrementWins("ana".into()),
        ]);

        drain(&state, &mut queue).await;

        let placements = store.fetch_placements().await.unwrap();
        assert_eq!(placements.len(), 1);
        assert_eq!(placements[0].position, 7);
        assert_eq!(
            store.fetch_stats("ana".into()).await.unwrap(),
            Some(StatsRecord { wins: 1, losses: 0 })
        );
    }

    #[tokio::test]
    async fn failing_writes_are_retried_then_dropped() {
        let (state, mut queue) = AppState::new(
            AppConfig::from_json_str(r#"{"durable_retry_attempts": 2}"#).unwrap(),
        );
        let store = Arc::new(FailingStore::default());
        state.install_store(store.clone()).await;
        state.enqueue_durable([DurableOp::ClearChat]);

        drain(&state, &mut queue).await;

        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalid_records_are_not_retried() {
        let (state, mut queue) = AppState::new(AppConfig::default());
        let store = Arc::new(FailingStore {
            corrupt: true,
            ..FailingStore::default()
        });
        state.install_store(store.clone()).await;
        state.enqueue_durable([DurableOp::ClearPlacements]);

        drain(&state, &mut queue).await;

        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn degraded_mode_drops_without_calling_a_store() {
        let (state, mut queue) = AppState::new(AppConfig::default());
        state.enqueue_durable([DurableOp::ClearPlacements]);

        drain(&state, &mut queue).await;
        assert!(queue.try_recv().is_err());
    }
}
