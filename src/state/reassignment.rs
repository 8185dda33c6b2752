//! Seat rotation applied once per won match.
//!
//! Winner and loser are resolved from the slot holders before anything moves, so the
//! stats delta always names the identities that actually played the finished match.

use crate::state::{
    match_machine::Symbol,
    registry::{ConnectionId, Registry, RoleChange, dedup_changes},
};

/// Slot holders at the moment the match was won.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Connection holding the winning symbol.
    pub winner_connection: ConnectionId,
    /// Username behind the winning connection.
    pub winner: String,
    /// Connection holding the other slot.
    pub loser_connection: ConnectionId,
    /// Username behind the losing connection.
    pub loser: String,
}

/// Counters to bump in the stats ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsDelta {
    /// Username whose `wins` goes up by one.
    pub winner: String,
    /// Username whose `losses` goes up by one.
    pub loser: String,
}

/// Which rotation was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    /// Loser went to the back of the lineup and the head spectator took its slot.
    Promoted {
        /// Connection that left the slot.
        demoted: ConnectionId,
        /// Connection that took the freed slot.
        promoted: ConnectionId,
        /// Symbol of the freed slot.
        symbol: Symbol,
    },
    /// No spectator could step in; the two players traded symbols.
    Swapped,
    /// Winner or loser could not be resolved; seats left untouched.
    Skipped,
}

/// Everything the post-game step decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostGame {
    /// Resolved slot holders, if both slots were held.
    pub resolution: Option<Resolution>,
    /// Stats to persist, if the match had two distinct identities.
    pub stats: Option<StatsDelta>,
    /// Rotation applied to the registry.
    pub rotation: Rotation,
    /// Connections whose role changed.
    pub role_changes: Vec<RoleChange>,
}

/// Resolve the holders of both slots for a match won by `winning`.
pub fn resolve(registry: &Registry, winning: Symbol) -> Option<Resolution> {
    let (winner_connection, winner) = registry.holder(winning)?;
    let (loser_connection, loser) = registry.holder(winning.opponent())?;
    Some(Resolution {
        winner_connection,
        winner: winner.username.clone(),
        loser_connection,
        loser: loser.username.clone(),
    })
}

/// Settle a won match: resolve identities, compute the stats delta, then rotate seats.
pub fn settle_win(registry: &mut Registry, winning: Symbol) -> PostGame {
    let Some(resolution) = resolve(registry, winning) else {
        return PostGame {
            resolution: None,
            stats: None,
            rotation: Rotation::Skipped,
            role_changes: Vec::new(),
        };
    };

    let stats = (resolution.winner != resolution.loser).then(|| StatsDelta {
        winner: resolution.winner.clone(),
        loser: resolution.loser.clone(),
    });

    let losing = winning.opponent();
    let (rotation, role_changes) = match registry.take_eligible_spectator(losing) {
        Some(promoted) => {
            registry.demote(resolution.loser_connection);
            registry.seat_player(promoted, losing);
            (
                Rotation::Promoted {
                    demoted: resolution.loser_connection,
                    promoted,
                    symbol: losing,
                },
                vec![
                    registry.role_change(resolution.loser_connection),
                    registry.role_change(promoted),
                ],
            )
        }
        None => {
            registry.swap_symbols();
            (
                Rotation::Swapped,
                vec![
                    registry.role_change(resolution.winner_connection),
                    registry.role_change(resolution.loser_connection),
                ],
            )
        }
    };

    PostGame {
        resolution: Some(resolution),
        stats,
        rotation,
        role_changes: dedup_changes(role_changes),
    }
}
