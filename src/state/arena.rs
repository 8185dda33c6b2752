//! The single shared match: registry, match machine and stats cache behind one
//! writer.
//!
//! Every operation validates first, mutates second and returns a [`Transition`]
//! listing the domain events to project onto the wire and the durable writes to
//! queue. Nothing here awaits; callers hold the arena lock for the whole call.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::state::{
    chat::ChatEntry,
    match_machine::{
        MatchMachine, MatchSnapshot, MatchStatus, MoveError, MoveResult, Outcome, Placement,
        Position, ResetForbidden, Symbol,
    },
    reassignment,
    registry::{ConnectionId, Registry, Role, RoleChange},
};

/// Win/loss counters for one username.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsRecord {
    /// Matches won.
    pub wins: u32,
    /// Matches lost.
    pub losses: u32,
}

/// Write to hand to the durable store after the in-memory transition committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DurableOp {
    /// Append to the move log.
    AppendPlacement(Placement),
    /// Truncate the move log.
    ClearPlacements,
    /// `wins += 1` for a username.
    IncrementWins(String),
    /// `losses += 1` for a username.
    IncrementLosses(String),
    /// Append to the chat log.
    AppendChat(ChatEntry),
    /// Truncate the chat log.
    ClearChat,
}

/// Semantic change produced by an arena operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArenaEvent {
    /// A connection joined; it needs its own view of the board and status.
    Joined {
        /// The new connection.
        connection_id: ConnectionId,
    },
    /// A connection's role was set or changed.
    RoleAssigned(RoleChange),
    /// A placement was appended.
    PlacementApplied(Placement),
    /// The turn passed to `symbol`.
    TurnChanged(Symbol),
    /// The match finished.
    MatchEnded {
        /// How it ended.
        outcome: Outcome,
        /// Username that held the winning slot.
        winner: Option<String>,
    },
    /// The board was cleared.
    MatchReset,
    /// The board was rebuilt from the durable move log.
    BoardRestored,
    /// Dev mode was toggled by a connection.
    DevModeChanged {
        /// Connection that toggled it.
        connection_id: ConnectionId,
        /// New state.
        enabled: bool,
    },
    /// Roles, lineup or stats changed.
    RosterChanged,
}

/// Output of one committed arena operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    /// Events to project, in order.
    pub events: Vec<ArenaEvent>,
    /// Durable writes to queue, in order.
    pub durable: Vec<DurableOp>,
}

impl Transition {
    fn push_event(&mut self, event: ArenaEvent) {
        self.events.push(event);
    }

    fn push_durable(&mut self, op: DurableOp) {
        self.durable.push(op);
    }

    /// Whether the operation changed nothing.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.durable.is_empty()
    }
}

/// A submit-move request rejected by the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The connection is not registered.
    #[error("connection is not registered")]
    UnknownConnection,
    /// The match rules rejected the move.
    #[error(transparent)]
    Rule(#[from] MoveError),
}

/// A reset request rejected by the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResetError {
    /// The connection is not registered.
    #[error("connection is not registered")]
    UnknownConnection,
    /// The connection is a spectator.
    #[error(transparent)]
    Forbidden(#[from] ResetForbidden),
}

/// A dev-mode toggle rejected by the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DevModeError {
    /// The connection is not registered.
    #[error("connection is not registered")]
    UnknownConnection,
    /// The identity lacks the dev-mode capability.
    #[error("dev mode is restricted to privileged accounts")]
    Forbidden,
}

/// Row of the roster snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    /// Connection behind the row.
    pub connection_id: ConnectionId,
    /// Identity.
    pub username: String,
    /// Current role.
    pub role: Role,
    /// Cached counters.
    pub stats: StatsRecord,
}

/// Read-only view of the arena taken after a transition commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaSnapshot {
    /// Every live connection in arrival order.
    pub roster: Vec<RosterEntry>,
    /// Usernames of spectators in promotion order.
    pub lineup: Vec<String>,
    /// Board and status.
    pub game: MatchSnapshot,
}

impl ArenaSnapshot {
    /// Roster row for a connection.
    pub fn entry(&self, connection_id: ConnectionId) -> Option<&RosterEntry> {
        self.roster
            .iter()
            .find(|entry| entry.connection_id == connection_id)
    }

    /// Number of slot holders and spectators.
    pub fn counts(&self) -> (usize, usize) {
        let players = self
            .roster
            .iter()
            .filter(|entry| entry.role.is_player())
            .count();
        (players, self.roster.len() - players)
    }
}

/// Shared match state. See the module docs for the calling discipline.
#[derive(Debug, Clone, Default)]
pub struct Arena {
    registry: Registry,
    game: MatchMachine,
    stats: HashMap<String, StatsRecord>,
    privileged: HashSet<String>,
}

impl Arena {
    /// Empty arena; `privileged` lists identities allowed to toggle dev mode.
    pub fn new(privileged: impl IntoIterator<Item = String>) -> Self {
        Self {
            privileged: privileged.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Read access to the registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Read access to the match.
    pub fn game(&self) -> &MatchMachine {
        &self.game
    }

    /// Cached counters for `username` (zero if never seen).
    pub fn stats(&self, username: &str) -> StatsRecord {
        self.stats.get(username).copied().unwrap_or_default()
    }

    /// Whether `username` holds the dev-mode capability.
    pub fn is_privileged(&self, username: &str) -> bool {
        self.privileged.contains(username)
    }

    /// Register a connection. `stats` refreshes the cache when the ledger answered.
    pub fn join(
        &mut self,
        connection_id: ConnectionId,
        username: &str,
        stats: Option<StatsRecord>,
    ) -> Transition {
        if let Some(fetched) = stats {
            // The ledger may lag behind increments still queued for persistence.
            let cached = self.stats.entry(username.to_owned()).or_default();
            cached.wins = cached.wins.max(fetched.wins);
            cached.losses = cached.losses.max(fetched.losses);
        }
        let role = self.registry.register(connection_id, username);

        let mut transition = Transition::default();
        transition.push_event(ArenaEvent::RoleAssigned(RoleChange {
            connection_id,
            username: username.to_owned(),
            role,
        }));
        transition.push_event(ArenaEvent::Joined { connection_id });
        transition.push_event(ArenaEvent::RosterChanged);
        transition
    }

    /// Drop a connection, promoting a spectator if a slot became free.
    pub fn leave(&mut self, connection_id: ConnectionId) -> Transition {
        let mut transition = Transition::default();
        let Some(departure) = self.registry.unregister(connection_id) else {
            return transition;
        };
        for promotion in departure.promotions {
            transition.push_event(ArenaEvent::RoleAssigned(promotion));
        }
        transition.push_event(ArenaEvent::RosterChanged);
        transition
    }

    /// Validate and apply a move, settling the match if it ended.
    pub fn submit_move(
        &mut self,
        connection_id: ConnectionId,
        position: Position,
        claimed: Symbol,
    ) -> Result<Transition, SubmitError> {
        let assigned = self
            .registry
            .lookup(connection_id)
            .ok_or(SubmitError::UnknownConnection)?
            .role
            .symbol();
        let result = self.game.submit(assigned, position, claimed)?;

        let placement = Placement {
            position,
            symbol: claimed,
        };
        let mut transition = Transition::default();
        transition.push_event(ArenaEvent::PlacementApplied(placement));
        transition.push_durable(DurableOp::AppendPlacement(placement));

        match result {
            MoveResult::Continue { next_turn } => {
                transition.push_event(ArenaEvent::TurnChanged(next_turn));
            }
            MoveResult::Ended(outcome @ Outcome::Draw) => {
                transition.push_event(ArenaEvent::MatchEnded {
                    outcome,
                    winner: None,
                });
            }
            MoveResult::Ended(outcome @ Outcome::Win { symbol, .. }) => {
                self.settle_win(outcome, symbol, &mut transition);
            }
        }

        Ok(transition)
    }

    fn settle_win(&mut self, outcome: Outcome, symbol: Symbol, transition: &mut Transition) {
        let post = reassignment::settle_win(&mut self.registry, symbol);

        if let Some(delta) = &post.stats {
            self.stats.entry(delta.winner.clone()).or_default().wins += 1;
            self.stats.entry(delta.loser.clone()).or_default().losses += 1;
            transition.push_durable(DurableOp::IncrementWins(delta.winner.clone()));
            transition.push_durable(DurableOp::IncrementLosses(delta.loser.clone()));
        }

        let winner = post
            .resolution
            .as_ref()
            .map(|resolution| resolution.winner.clone())
            .or_else(|| {
                self.registry
                    .holder(symbol)
                    .map(|(_, seat)| seat.username.clone())
            });
        transition.push_event(ArenaEvent::MatchEnded { outcome, winner });

        for change in post.role_changes {
            transition.push_event(ArenaEvent::RoleAssigned(change));
        }
        transition.push_event(ArenaEvent::RosterChanged);
    }

    /// Clear the board. Only slot holders may reset.
    pub fn reset(&mut self, connection_id: ConnectionId) -> Result<Transition, ResetError> {
        let assigned = self
            .registry
            .lookup(connection_id)
            .ok_or(ResetError::UnknownConnection)?
            .role
            .symbol();
        self.game.reset(assigned)?;

        let mut transition = Transition::default();
        transition.push_event(ArenaEvent::MatchReset);
        transition.push_event(ArenaEvent::TurnChanged(Symbol::X));
        transition.push_durable(DurableOp::ClearPlacements);
        Ok(transition)
    }

    /// Flip the privileged bypass for the identity behind `connection_id`.
    pub fn toggle_dev_mode(
        &mut self,
        connection_id: ConnectionId,
    ) -> Result<Transition, DevModeError> {
        let username = self
            .registry
            .lookup(connection_id)
            .ok_or(DevModeError::UnknownConnection)?
            .username
            .clone();
        if !self.is_privileged(&username) {
            return Err(DevModeError::Forbidden);
        }

        let enabled = !self.registry.is_bypassed(&username);
        let changes = self.registry.set_bypass(&username, enabled);

        let mut transition = Transition::default();
        transition.push_event(ArenaEvent::DevModeChanged {
            connection_id,
            enabled,
        });
        for change in changes {
            transition.push_event(ArenaEvent::RoleAssigned(change));
        }
        transition.push_event(ArenaEvent::RosterChanged);
        Ok(transition)
    }

    /// Rebuild the board from a stored move log if nothing was played yet.
    ///
    /// Returns `None` when the board already moved on or the log is empty.
    pub fn restore_board(&mut self, log: Vec<Placement>) -> Option<Transition> {
        if log.is_empty() || !self.game.is_pristine() {
            return None;
        }
        let (game, _skipped) = MatchMachine::replay(log);
        self.game = game;

        let mut transition = Transition::default();
        transition.push_event(ArenaEvent::BoardRestored);
        Some(transition)
    }

    /// Take a read-only view for projections.
    pub fn snapshot(&self) -> ArenaSnapshot {
        let roster = self
            .registry
            .seats()
            .map(|(connection_id, seat)| RosterEntry {
                connection_id,
                username: seat.username.clone(),
                role: seat.role,
                stats: self.stats(&seat.username),
            })
            .collect();
        let lineup = self
            .registry
            .lineup()
            .map(|(_, seat)| seat.username.clone())
            .collect();

        ArenaSnapshot {
            roster,
            lineup,
            game: self.game.snapshot(),
        }
    }

    /// Current match status.
    pub fn status(&self) -> MatchStatus {
        self.game.status()
    }
}
