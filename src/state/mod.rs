pub mod arena;
pub mod chat;
pub mod match_machine;
pub mod reassignment;
pub mod registry;
pub mod sessions;

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tracing::warn;

use crate::{
    config::AppConfig,
    dao::arena_store::ArenaStore,
    error::ServiceError,
    state::{
        arena::{Arena, DurableOp},
        chat::ChatChannel,
        registry::ConnectionId,
        sessions::SessionStore,
    },
};

pub type SharedState = Arc<AppState>;

#[derive(Clone)]
/// Handle used to push messages to a connected client.
pub struct ClientConnection {
    pub username: String,
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Central application state: the match arena, chat log, live sockets and storage handle.
pub struct AppState {
    config: Arc<AppConfig>,
    store: RwLock<Option<Arc<dyn ArenaStore>>>,
    degraded: watch::Sender<bool>,
    arena: Mutex<Arena>,
    chat: Mutex<ChatChannel>,
    connections: DashMap<ConnectionId, ClientConnection>,
    sessions: SessionStore,
    durable_tx: mpsc::UnboundedSender<DurableOp>,
    restore_pending: AtomicBool,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`], plus the receiving end of the
    /// durable write queue for the persistence worker.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> (SharedState, mpsc::UnboundedReceiver<DurableOp>) {
        let (degraded_tx, _rx) = watch::channel(true);
        let (durable_tx, durable_rx) = mpsc::unbounded_channel();
        let state = Arc::new(Self {
            store: RwLock::new(None),
            degraded: degraded_tx,
            arena: Mutex::new(Arena::new(config.privileged_usernames().iter().cloned())),
            chat: Mutex::new(ChatChannel::new(
                config.chat_history_limit(),
                config.chat_max_chars(),
            )),
            connections: DashMap::new(),
            sessions: SessionStore::new(config.session_ttl()),
            durable_tx,
            restore_pending: AtomicBool::new(true),
            config: Arc::new(config),
        });
        (state, durable_rx)
    }

    /// Application configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn ArenaStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Current store or [`ServiceError::Degraded`].
    pub async fn require_store(&self) -> Result<Arc<dyn ArenaStore>, ServiceError> {
        self.store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn install_store(&self, store: Arc<dyn ArenaStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// The single-writer match state.
    pub fn arena(&self) -> &Mutex<Arena> {
        &self.arena
    }

    /// The shared chat log.
    pub fn chat(&self) -> &Mutex<ChatChannel> {
        &self.chat
    }

    /// Live sockets keyed by connection.
    pub fn connections(&self) -> &DashMap<ConnectionId, ClientConnection> {
        &self.connections
    }

    /// Login sessions.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Queue durable writes in commit order.
    pub fn enqueue_durable(&self, ops: impl IntoIterator<Item = DurableOp>) {
        for op in ops {
            if self.durable_tx.send(op).is_err() {
                warn!("persistence worker stopped; dropping durable write");
                return;
            }
        }
    }

    /// Claim the one-time restore from durable storage. Returns `true` only once.
    pub fn take_restore(&self) -> bool {
        self.restore_pending.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::arena_store::memory::MemoryArenaStore,
        state::match_machine::{Placement, Position, Symbol},
    };

    #[tokio::test]
    async fn store_installation_toggles_degraded_mode() {
        let (state, _rx) = AppState::new(AppConfig::default());
        let mut watcher = state.degraded_watcher();
        assert!(state.is_degraded().await);

        state.install_store(Arc::new(MemoryArenaStore::new())).await;
        assert!(!state.is_degraded().await);
        assert!(watcher.has_changed().unwrap());
        assert!(!*watcher.borrow_and_update());

        state.clear_store().await;
        assert!(state.is_degraded().await);
        assert!(state.require_store().await.is_err());
    }

    #[tokio::test]
    async fn durable_ops_are_queued_in_order() {
        let (state, mut rx) = AppState::new(AppConfig::default());
        let placement = Placement {
            position: Position::new(5).unwrap(),
            symbol: Symbol::X,
        };
        state.enqueue_durable([DurableOp::AppendPlacement(placement), DurableOp::ClearChat]);

        assert_eq!(rx.recv().await, Some(DurableOp::AppendPlacement(placement)));
        assert_eq!(rx.recv().await, Some(DurableOp::ClearChat));
    }

    #[test]
    fn restore_is_claimed_once() {
        let (state, _rx) = AppState::new(AppConfig::default());
        assert!(state.take_restore());
        assert!(!state.take_restore());
    }
}
