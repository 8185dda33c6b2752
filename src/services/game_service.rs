//! Match operations driven by WebSocket clients.
//!
//! Each operation takes the arena lock, applies one transition and, still under the
//! lock, projects and delivers the resulting messages and queues the durable writes.
//! Holding the lock across delivery keeps every client's message order identical to
//! commit order.

use std::sync::Arc;

use axum::extract::ws::Message;
use thiserror::Error;
use tokio::{sync::mpsc, time::timeout};
use tracing::{info, warn};

use crate::{
    dao::arena_store::ArenaStore,
    dto::ws::{RejectReason, ServerMessage, SymbolDto},
    services::{
        broadcast::{self, Outbound},
        chat_service,
    },
    state::{
        ClientConnection, SharedState,
        arena::{Arena, DevModeError, ResetError, StatsRecord, SubmitError, Transition},
        match_machine::{MoveError, Placement, Position},
        registry::ConnectionId,
    },
};

/// Why a client action was refused.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The payload could not be understood.
    #[error("malformed message: {0}")]
    Malformed(String),
    /// A move broke a match rule.
    #[error(transparent)]
    Move(#[from] SubmitError),
    /// A reset came from someone who is not a player.
    #[error(transparent)]
    Reset(#[from] ResetError),
    /// Dev mode was toggled without the capability.
    #[error(transparent)]
    DevMode(#[from] DevModeError),
}

impl ActionError {
    /// Wire reason carried by `actionRejected`.
    pub fn reason(&self) -> RejectReason {
        match self {
            ActionError::Malformed(_) => RejectReason::MalformedMessage,
            ActionError::Move(SubmitError::Rule(rule)) => match rule {
                MoveError::InvalidState => RejectReason::InvalidState,
                MoveError::RoleMismatch { .. } => RejectReason::RoleMismatch,
                MoveError::TurnViolation { .. } => RejectReason::TurnViolation,
                MoveError::CellOccupied(_) => RejectReason::CellOccupied,
            },
            ActionError::Reset(ResetError::Forbidden(_)) => RejectReason::Forbidden,
            ActionError::DevMode(DevModeError::Forbidden) => RejectReason::Forbidden,
            ActionError::Move(SubmitError::UnknownConnection)
            | ActionError::Reset(ResetError::UnknownConnection)
            | ActionError::DevMode(DevModeError::UnknownConnection) => RejectReason::InvalidState,
        }
    }

    /// Unicast payload describing the refusal.
    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::rejected(self.reason(), self.to_string())
    }
}

/// Project a committed transition, deliver it and queue its durable writes.
///
/// Must be called while the arena lock is held.
fn commit(state: &SharedState, arena: &Arena, transition: Transition) {
    if transition.is_empty() {
        return;
    }
    let outbound = broadcast::project(&arena.snapshot(), &transition.events);
    broadcast::deliver(state, outbound);
    state.enqueue_durable(transition.durable);
}

/// Register a new connection and bring it up to date.
pub async fn join(
    state: &SharedState,
    connection_id: ConnectionId,
    username: &str,
    tx: mpsc::UnboundedSender<Message>,
) {
    // Ledger lookups happen before the lock so a slow store cannot stall the match.
    let stats = fetch_stats(state, username).await;

    {
        let mut arena = state.arena().lock().await;
        // Registered under the lock so the first frames this socket sees are its own join.
        state.connections().insert(
            connection_id,
            ClientConnection {
                username: username.to_owned(),
                tx,
            },
        );
        let transition = arena.join(connection_id, username, stats);
        commit(state, &arena, transition);

        if arena.is_privileged(username) {
            broadcast::deliver(
                state,
                [Outbound::only(
                    connection_id,
                    ServerMessage::DevModeChanged {
                        enabled: arena.registry().is_bypassed(username),
                    },
                )],
            );
        }
    }

    chat_service::send_history(state, connection_id).await;
    info!(%connection_id, username, "client joined");
}

/// Unregister a connection, promoting a waiting spectator into any freed slot.
pub async fn leave(state: &SharedState, connection_id: ConnectionId) {
    state.connections().remove(&connection_id);

    let mut arena = state.arena().lock().await;
    let transition = arena.leave(connection_id);
    commit(state, &arena, transition);
    info!(%connection_id, "client left");
}

/// Validate and apply a move.
pub async fn submit_move(
    state: &SharedState,
    connection_id: ConnectionId,
    position: u8,
    symbol: SymbolDto,
) -> Result<(), ActionError> {
    let position = Position::new(position)
        .ok_or_else(|| ActionError::Malformed(format!("position {position} is not in 1..=9")))?;

    let mut arena = state.arena().lock().await;
    let transition = arena.submit_move(connection_id, position, symbol.into())?;
    commit(state, &arena, transition);
    Ok(())
}

/// Clear the board; players only.
pub async fn reset(state: &SharedState, connection_id: ConnectionId) -> Result<(), ActionError> {
    let mut arena = state.arena().lock().await;
    let transition = arena.reset(connection_id)?;
    commit(state, &arena, transition);
    info!(%connection_id, "match reset");
    Ok(())
}

/// Flip dev mode for the identity behind the connection; privileged identities only.
pub async fn toggle_dev_mode(
    state: &SharedState,
    connection_id: ConnectionId,
) -> Result<(), ActionError> {
    let mut arena = state.arena().lock().await;
    let transition = arena.toggle_dev_mode(connection_id)?;
    commit(state, &arena, transition);
    Ok(())
}

/// Rebuild the board from the durable move log once, right after the first store
/// is installed.
pub async fn restore_from_store(state: &SharedState, store: Arc<dyn ArenaStore>) {
    let limit = state.config().durable_call_timeout();
    let entities = match timeout(limit, store.fetch_placements()).await {
        Ok(Ok(entities)) => entities,
        Ok(Err(err)) => {
            warn!(error = %err, "failed to load move log; starting with an empty board");
            return;
        }
        Err(_) => {
            warn!("loading move log timed out; starting with an empty board");
            return;
        }
    };

    let log: Vec<Placement> = entities
        .into_iter()
        .filter_map(|entity| match Placement::try_from(entity) {
            Ok(placement) => Some(placement),
            Err(err) => {
                warn!(error = %err, "skipping invalid move log entry");
                None
            }
        })
        .collect();
    let count = log.len();

    let mut arena = state.arena().lock().await;
    if let Some(transition) = arena.restore_board(log) {
        commit(state, &arena, transition);
        info!(placements = count, status = ?arena.status(), "board restored from move log");
    }
}

async fn fetch_stats(state: &SharedState, username: &str) -> Option<StatsRecord> {
    let store = state.store().await?;
    let limit = state.config().durable_call_timeout();
    match timeout(limit, store.fetch_stats(username.to_owned())).await {
        Ok(Ok(stats)) => stats,
        Ok(Err(err)) => {
            warn!(username, error = %err, "failed to fetch stats; using cached values");
            None
        }
        Err(_) => {
            warn!(username, "stats lookup timed out; using cached values");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use tokio::sync::mpsc::UnboundedReceiver;
    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            arena_store::memory::MemoryArenaStore,
            models::{PlacementEntity, UserEntity},
        },
        state::{
            AppState,
            arena::DurableOp,
            match_machine::{MatchStatus, Symbol},
        },
    };

    fn drain(rx: &mut UnboundedReceiver<Message>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let Message::Text(text) = message {
                out.push(serde_json::from_str(text.as_str()).unwrap());
            }
        }
        out
    }

    fn types(messages: &[Value]) -> Vec<&str> {
        messages
            .iter()
            .map(|message| message["type"].as_str().unwrap())
            .collect()
    }

    async fn connect(state: &SharedState, username: &str) -> (ConnectionId, UnboundedReceiver<Message>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        join(state, id, username, tx).await;
        (id, rx)
    }

    #[tokio::test]
    async fn join_sends_role_board_status_roster_and_chat() {
        let (state, _durable) = AppState::new(AppConfig::default());
        let (_, mut rx) = connect(&state, "ana").await;

        let messages = drain(&mut rx);
        assert_eq!(
            types(&messages),
            vec![
                "roleAssigned",
                "boardSnapshot",
                "turnChanged",
                "rosterStats",
                "spectatorLineup",
                "rosterCounts",
                "chatHistory"
            ]
        );
        assert_eq!(messages[0]["role"], "x");
        assert_eq!(messages[0]["stats"]["wins"], 0);
    }

    #[tokio::test]
    async fn joining_socket_hears_nothing_before_its_own_join() {
        let (state, _durable) = AppState::new(AppConfig::default());
        let guard = state.arena().lock().await;

        let id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let joining = tokio::spawn({
            let state = state.clone();
            async move { join(&state, id, "cy", tx).await }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        // Another commit lands while the join waits on the lock.
        broadcast::deliver(&state, [Outbound::everyone(ServerMessage::MatchReset)]);
        drop(guard);
        joining.await.unwrap();

        let messages = drain(&mut rx);
        assert_eq!(types(&messages)[0], "roleAssigned");
        assert!(!types(&messages).contains(&"matchReset"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_claims_on_one_cell_admit_exactly_one() {
        let (state, _durable) = AppState::new(AppConfig::default());
        let (ana, _ana_rx) = connect(&state, "ana").await;
        let (bo, _bo_rx) = connect(&state, "bo").await;

        let mut tasks = Vec::new();
        for i in 0..32 {
            let state = state.clone();
            let (id, symbol) = if i % 2 == 0 {
                (ana, SymbolDto::X)
            } else {
                (bo, SymbolDto::O)
            };
            tasks.push(tokio::spawn(async move {
                submit_move(&state, id, 5, symbol).await
            }));
        }

        let mut accepted = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(()) => accepted += 1,
                Err(err) => assert!(
                    matches!(
                        err.reason(),
                        RejectReason::CellOccupied | RejectReason::TurnViolation
                    ),
                    "unexpected rejection {err:?}"
                ),
            }
        }

        assert_eq!(accepted, 1);
        let arena = state.arena().lock().await;
        assert_eq!(arena.game().board().placements().len(), 1);
        assert_eq!(arena.status(), MatchStatus::Active { turn: Symbol::O });
    }

    #[tokio::test]
    async fn join_picks_up_ledger_stats() {
        let (state, _durable) = AppState::new(AppConfig::default());
        let store = MemoryArenaStore::new();
        store
            .create_user(UserEntity {
                wins: 4,
                losses: 2,
                ..UserEntity::new("ana".into(), "hash".into())
            })
            .await
            .unwrap();
        state.install_store(Arc::new(store)).await;

        let (_, mut rx) = connect(&state, "ana").await;
        let messages = drain(&mut rx);
        assert_eq!(messages[0]["stats"]["wins"], 4);
        assert_eq!(messages[0]["stats"]["losses"], 2);
    }

    #[tokio::test]
    async fn rejected_move_leaves_board_untouched() {
        let (state, mut durable) = AppState::new(AppConfig::default());
        let (ana, _ana_rx) = connect(&state, "ana").await;
        let (bo, _bo_rx) = connect(&state, "bo").await;

        let err = submit_move(&state, bo, 5, SymbolDto::O).await.unwrap_err();
        assert_eq!(err.reason(), RejectReason::TurnViolation);

        let err = submit_move(&state, ana, 5, SymbolDto::O).await.unwrap_err();
        assert_eq!(err.reason(), RejectReason::RoleMismatch);

        let err = submit_move(&state, ana, 10, SymbolDto::X).await.unwrap_err();
        assert_eq!(err.reason(), RejectReason::MalformedMessage);

        assert!(state.arena().lock().await.game().board().is_empty());
        assert!(durable.try_recv().is_err());
    }

    #[tokio::test]
    async fn accepted_move_is_broadcast_and_queued() {
        let (state, mut durable) = AppState::new(AppConfig::default());
        let (ana, mut ana_rx) = connect(&state, "ana").await;
        let (_bo, mut bo_rx) = connect(&state, "bo").await;
        drain(&mut ana_rx);
        drain(&mut bo_rx);

        submit_move(&state, ana, 5, SymbolDto::X).await.unwrap();

        let seen = drain(&mut bo_rx);
        assert_eq!(types(&seen), vec!["placementApplied", "turnChanged"]);
        assert_eq!(seen[0]["position"], 5);
        assert_eq!(seen[1]["symbol"], "o");
        assert!(matches!(
            durable.try_recv(),
            Ok(DurableOp::AppendPlacement(_))
        ));
    }

    #[tokio::test]
    async fn spectator_reset_is_forbidden() {
        let (state, _durable) = AppState::new(AppConfig::default());
        connect(&state, "ana").await;
        connect(&state, "bo").await;
        let (cy, _rx) = connect(&state, "cy").await;

        let err = reset(&state, cy).await.unwrap_err();
        assert_eq!(err.reason(), RejectReason::Forbidden);
    }

    #[tokio::test]
    async fn player_leaving_promotes_first_spectator() {
        let (state, _durable) = AppState::new(AppConfig::default());
        let (ana, _ana_rx) = connect(&state, "ana").await;
        connect(&state, "bo").await;
        let (cy, mut cy_rx) = connect(&state, "cy").await;
        drain(&mut cy_rx);

        leave(&state, ana).await;

        let seen = drain(&mut cy_rx);
        assert_eq!(seen[0]["type"], "roleAssigned");
        assert_eq!(seen[0]["role"], "x");
        let arena = state.arena().lock().await;
        assert!(arena.registry().lookup(cy).unwrap().role.is_player());
    }

    #[tokio::test]
    async fn dev_mode_is_refused_for_regular_accounts() {
        let (state, _durable) = AppState::new(AppConfig::default());
        let (ana, _rx) = connect(&state, "ana").await;
        let err = toggle_dev_mode(&state, ana).await.unwrap_err();
        assert_eq!(err.reason(), RejectReason::Forbidden);
    }

    #[tokio::test]
    async fn restore_replays_stored_moves_once() {
        let (state, _durable) = AppState::new(AppConfig::default());
        let store = MemoryArenaStore::new();
        for (position, symbol) in [(1, "x"), (5, "o"), (42, "x")] {
            store
                .append_placement(PlacementEntity {
                    position,
                    symbol: symbol.into(),
                })
                .await
                .unwrap();
        }
        let store: Arc<dyn ArenaStore> = Arc::new(store);

        restore_from_store(&state, store.clone()).await;
        {
            let arena = state.arena().lock().await;
            assert_eq!(arena.game().board().placements().len(), 2);
            assert_eq!(arena.status(), MatchStatus::Active { turn: Symbol::X });
        }

        // Second restore is a no-op because the board is no longer pristine.
        restore_from_store(&state, store).await;
        assert_eq!(
            state.arena().lock().await.game().board().placements().len(),
            2
        );
    }
}
