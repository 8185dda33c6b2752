use std::{sync::Arc, time::SystemTime};

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::{
    dao::arena_store::ArenaStore,
    dto::ws::{ChatEntryDto, ServerMessage},
    services::broadcast::{self, Outbound},
    state::{SharedState, arena::DurableOp, chat::ChatEntry, registry::ConnectionId},
};

fn history_message(entries: &[ChatEntry]) -> ServerMessage {
    ServerMessage::ChatHistory {
        entries: entries.iter().map(ChatEntryDto::from).collect(),
    }
}

/// Unicast the retained chat log to one connection.
pub async fn send_history(state: &SharedState, connection_id: ConnectionId) {
    let chat = state.chat().lock().await;
    broadcast::deliver(
        state,
        [Outbound::only(connection_id, history_message(&chat.history()))],
    );
}

/// Append a message and broadcast it. Empty or oversized text is dropped silently.
pub async fn post(state: &SharedState, username: &str, text: &str) {
    let mut chat = state.chat().lock().await;
    let Some(entry) = chat.post(username, text, SystemTime::now()) else {
        debug!(username, "chat message rejected by length rules");
        return;
    };

    let dto = ChatEntryDto::from(&entry);
    broadcast::deliver(
        state,
        [Outbound::everyone(ServerMessage::ChatPosted {
            username: dto.username,
            text: dto.text,
            timestamp: dto.timestamp,
        })],
    );
    state.enqueue_durable([DurableOp::AppendChat(entry)]);
}

/// Truncate the log and broadcast the empty history.
pub async fn clear(state: &SharedState, username: &str) {
    let mut chat = state.chat().lock().await;
    chat.clear();
    broadcast::deliver(state, [Outbound::everyone(history_message(&[]))]);
    state.enqueue_durable([DurableOp::ClearChat]);
    info!(username, "chat cleared");
}

/// Load the newest stored entries if nothing was said since startup.
pub async fn restore_from_store(state: &SharedState, store: Arc<dyn ArenaStore>) {
    let config = state.config();
    let entries = match timeout(
        config.durable_call_timeout(),
        store.fetch_chat(config.chat_history_limit()),
    )
    .await
    {
        Ok(Ok(entries)) => entries,
        Ok(Err(err)) => {
            warn!(error = %err, "failed to load chat log");
            return;
        }
        Err(_) => {
            warn!("loading chat log timed out");
            return;
        }
    };
    if entries.is_empty() {
        return;
    }

    let mut chat = state.chat().lock().await;
    if !chat.is_empty() {
        return;
    }
    chat.restore(entries.into_iter().map(ChatEntry::from));
    let history = chat.history();
    broadcast::deliver(state, [Outbound::everyone(history_message(&history))]);
    info!(entries = history.len(), "chat restored from storage");
}
