//! Projection of committed arena events onto wire messages, and their fan-out.
//!
//! [`project`] is pure: it only reads the snapshot taken after the transition
//! committed. [`deliver`] pushes the result onto the per-socket writer channels.

use std::collections::HashSet;

use axum::extract::ws::Message;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    dto::ws::{OutcomeKind, PlacementDto, RosterEntryDto, ServerMessage},
    state::{
        AppState,
        arena::{ArenaEvent, ArenaSnapshot},
        match_machine::{MatchStatus, Outcome},
        registry::ConnectionId,
    },
};

/// Who receives an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Every registered connection.
    Everyone,
    /// A single connection.
    Only(ConnectionId),
}

/// A message paired with its recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Recipients.
    pub audience: Audience,
    /// Payload sent to each recipient.
    pub message: ServerMessage,
}

impl Outbound {
    /// Broadcast to all connections.
    pub fn everyone(message: ServerMessage) -> Self {
        Self {
            audience: Audience::Everyone,
            message,
        }
    }

    /// Unicast to one connection.
    pub fn only(connection_id: ConnectionId, message: ServerMessage) -> Self {
        Self {
            audience: Audience::Only(connection_id),
            message,
        }
    }
}

/// Turn domain events into wire messages, one per semantic change.
pub fn project(snapshot: &ArenaSnapshot, events: &[ArenaEvent]) -> Vec<Outbound> {
    let mut out = Vec::new();
    for event in events {
        match event {
            ArenaEvent::RoleAssigned(change) => {
                // A connection that already left has nobody to tell.
                let Some(entry) = snapshot.entry(change.connection_id) else {
                    continue;
                };
                out.push(Outbound::only(
                    change.connection_id,
                    ServerMessage::RoleAssigned {
                        role: change.role.into(),
                        username: change.username.clone(),
                        stats: entry.stats.into(),
                    },
                ));
            }
            ArenaEvent::Joined { connection_id } => {
                out.push(Outbound::only(*connection_id, board_snapshot(snapshot)));
                match snapshot.game.status {
                    MatchStatus::Active { turn } => out.push(Outbound::everyone(
                        ServerMessage::TurnChanged {
                            symbol: turn.into(),
                        },
                    )),
                    MatchStatus::Ended(outcome) => out.push(Outbound::only(
                        *connection_id,
                        match_ended(outcome, winner_of(snapshot, outcome)),
                    )),
                }
            }
            ArenaEvent::PlacementApplied(placement) => {
                out.push(Outbound::everyone(ServerMessage::PlacementApplied {
                    position: placement.position.get(),
                    symbol: placement.symbol.into(),
                }));
            }
            ArenaEvent::TurnChanged(symbol) => {
                out.push(Outbound::everyone(ServerMessage::TurnChanged {
                    symbol: (*symbol).into(),
                }));
            }
            ArenaEvent::MatchEnded { outcome, winner } => {
                out.push(Outbound::everyone(match_ended(*outcome, winner.clone())));
            }
            ArenaEvent::MatchReset => out.push(Outbound::everyone(ServerMessage::MatchReset)),
            ArenaEvent::BoardRestored => {
                out.push(Outbound::everyone(board_snapshot(snapshot)));
                let status = match snapshot.game.status {
                    MatchStatus::Active { turn } => ServerMessage::TurnChanged {
                        symbol: turn.into(),
                    },
                    MatchStatus::Ended(outcome) => match_ended(outcome, None),
                };
                out.push(Outbound::everyone(status));
            }
            ArenaEvent::DevModeChanged {
                connection_id,
                enabled,
            } => out.push(Outbound::only(
                *connection_id,
                ServerMessage::DevModeChanged { enabled: *enabled },
            )),
            ArenaEvent::RosterChanged => out.extend(roster_messages(snapshot)),
        }
    }
    out
}

fn board_snapshot(snapshot: &ArenaSnapshot) -> ServerMessage {
    ServerMessage::BoardSnapshot {
        placements: snapshot
            .game
            .placements
            .iter()
            .copied()
            .map(PlacementDto::from)
            .collect(),
    }
}

/// Best-effort winner name for a late joiner: whoever holds the winning symbol now.
fn winner_of(snapshot: &ArenaSnapshot, outcome: Outcome) -> Option<String> {
    let Outcome::Win { symbol, .. } = outcome else {
        return None;
    };
    snapshot
        .roster
        .iter()
        .find(|entry| entry.role.symbol() == Some(symbol))
        .map(|entry| entry.username.clone())
}

fn match_ended(outcome: Outcome, winner_username: Option<String>) -> ServerMessage {
    match outcome {
        Outcome::Win { symbol, line } => ServerMessage::MatchEnded {
            outcome: OutcomeKind::Win,
            symbol: Some(symbol.into()),
            winning_line: Some(line.to_vec()),
            winner_username,
        },
        Outcome::Draw => ServerMessage::MatchEnded {
            outcome: OutcomeKind::Draw,
            symbol: None,
            winning_line: None,
            winner_username: None,
        },
    }
}

/// `rosterStats`, `spectatorLineup` and `rosterCounts`, all broadcast.
pub fn roster_messages(snapshot: &ArenaSnapshot) -> [Outbound; 3] {
    let mut seen = HashSet::new();
    let entries = snapshot
        .roster
        .iter()
        .filter(|entry| seen.insert(entry.username.as_str()))
        .map(RosterEntryDto::from)
        .collect();
    let (active_players, spectators) = snapshot.counts();

    [
        Outbound::everyone(ServerMessage::RosterStats { entries }),
        Outbound::everyone(ServerMessage::SpectatorLineup {
            usernames: snapshot.lineup.clone(),
        }),
        Outbound::everyone(ServerMessage::RosterCounts {
            active_players,
            spectators,
        }),
    ]
}

/// Push projected messages to their recipients.
pub fn deliver(state: &AppState, outbound: impl IntoIterator<Item = Outbound>) {
    for Outbound { audience, message } in outbound {
        let Some(payload) = serialize(&message) else {
            continue;
        };
        match audience {
            Audience::Everyone => {
                for connection in state.connections().iter() {
                    push(&connection.tx, payload.clone(), connection.key());
                }
            }
            Audience::Only(connection_id) => {
                let Some(tx) = state
                    .connections()
                    .get(&connection_id)
                    .map(|connection| connection.tx.clone())
                else {
                    debug!(%connection_id, "recipient already disconnected");
                    continue;
                };
                push(&tx, payload, &connection_id);
            }
        }
    }
}

fn serialize(message: &ServerMessage) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(payload) => Some(payload),
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{message:?}`");
            None
        }
    }
}

fn push(tx: &mpsc::UnboundedSender<Message>, payload: String, connection_id: &ConnectionId) {
    if tx.send(Message::Text(payload.into())).is_err() {
        // The socket task is shutting down and will unregister itself.
        debug!(%connection_id, "writer closed; message dropped");
    }
}

/// Serialize a payload and push it onto a single WebSocket writer.
///
/// Returns `false` when the writer is gone.
pub fn send_message_to_websocket(
    tx: &mpsc::UnboundedSender<Message>,
    message: &ServerMessage,
) -> bool {
    match serialize(message) {
        Some(payload) => tx.send(Message::Text(payload.into())).is_ok(),
        None => true,
    }
}
