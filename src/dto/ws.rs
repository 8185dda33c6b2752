use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    dto::format_system_time,
    state::{
        arena::{RosterEntry, StatsRecord},
        chat::ChatEntry,
        match_machine::{Placement, Symbol},
        registry::Role,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
/// Player symbol on the wire.
#[serde(rename_all = "lowercase")]
pub enum SymbolDto {
    X,
    O,
}

impl From<Symbol> for SymbolDto {
    fn from(value: Symbol) -> Self {
        match value {
            Symbol::X => Self::X,
            Symbol::O => Self::O,
        }
    }
}

impl From<SymbolDto> for Symbol {
    fn from(value: SymbolDto) -> Self {
        match value {
            SymbolDto::X => Self::X,
            SymbolDto::O => Self::O,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
/// Role of a connection on the wire.
#[serde(rename_all = "lowercase")]
pub enum RoleDto {
    X,
    O,
    Spectator,
}

impl From<Role> for RoleDto {
    fn from(value: Role) -> Self {
        match value {
            Role::Player(Symbol::X) => Self::X,
            Role::Player(Symbol::O) => Self::O,
            Role::Spectator => Self::Spectator,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct StatsDto {
    pub wins: u32,
    pub losses: u32,
}

impl From<StatsRecord> for StatsDto {
    fn from(value: StatsRecord) -> Self {
        Self {
            wins: value.wins,
            losses: value.losses,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct PlacementDto {
    /// Cell number `1..=9`, row-major.
    pub position: u8,
    pub symbol: SymbolDto,
}

impl From<Placement> for PlacementDto {
    fn from(value: Placement) -> Self {
        Self {
            position: value.position.get(),
            symbol: value.symbol.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
/// One row of the `rosterStats` broadcast.
pub struct RosterEntryDto {
    pub username: String,
    pub role: RoleDto,
    pub wins: u32,
    pub losses: u32,
}

impl From<&RosterEntry> for RosterEntryDto {
    fn from(value: &RosterEntry) -> Self {
        Self {
            username: value.username.clone(),
            role: value.role.into(),
            wins: value.stats.wins,
            losses: value.stats.losses,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ChatEntryDto {
    pub username: String,
    pub text: String,
    /// RFC 3339 acceptance time.
    pub timestamp: String,
}

impl From<&ChatEntry> for ChatEntryDto {
    fn from(value: &ChatEntry) -> Self {
        Self {
            username: value.author.clone(),
            text: value.text.clone(),
            timestamp: format_system_time(value.timestamp),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Win,
    Draw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
/// Why an inbound action was refused.
#[serde(rename_all = "camelCase")]
pub enum RejectReason {
    RoleMismatch,
    TurnViolation,
    CellOccupied,
    InvalidState,
    Forbidden,
    MalformedMessage,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Messages accepted from game WebSocket clients.
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Place `symbol` on `position`.
    SubmitMove { position: u8, symbol: SymbolDto },
    /// Clear the board (players only).
    ResetMatch,
    /// Append to the shared chat.
    PostChat { text: String },
    /// Truncate the shared chat.
    ClearChat,
    /// Flip the privileged dual-seat mode.
    ToggleDevMode,
}

impl ClientMessage {
    /// Parse a text frame.
    pub fn from_json_str(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
/// Messages pushed to game WebSocket clients.
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Unicast to the connection whose role changed.
    RoleAssigned {
        role: RoleDto,
        username: String,
        stats: StatsDto,
    },
    /// Unicast on join.
    BoardSnapshot { placements: Vec<PlacementDto> },
    PlacementApplied { position: u8, symbol: SymbolDto },
    TurnChanged { symbol: SymbolDto },
    MatchReset,
    MatchEnded {
        outcome: OutcomeKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        symbol: Option<SymbolDto>,
        #[serde(rename = "winningLine", skip_serializing_if = "Option::is_none")]
        winning_line: Option<Vec<u8>>,
        #[serde(rename = "winnerUsername", skip_serializing_if = "Option::is_none")]
        winner_username: Option<String>,
    },
    RosterStats { entries: Vec<RosterEntryDto> },
    SpectatorLineup { usernames: Vec<String> },
    RosterCounts {
        #[serde(rename = "activePlayers")]
        active_players: usize,
        spectators: usize,
    },
    ChatPosted {
        username: String,
        text: String,
        timestamp: String,
    },
    ChatHistory { entries: Vec<ChatEntryDto> },
    /// Unicast to the connection that toggled.
    DevModeChanged { enabled: bool },
    /// Unicast to the connection whose action was refused.
    ActionRejected {
        reason: RejectReason,
        message: String,
    },
}

impl ServerMessage {
    pub fn rejected(reason: RejectReason, message: impl Into<String>) -> Self {
        Self::ActionRejected {
            reason,
            message: message.into(),
        }
    }
}
