use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::{
    dao::storage::StorageError,
    state::{
        arena::StatsRecord,
        chat::ChatEntry,
        match_machine::{Placement, Position, Symbol},
    },
};

/// Account record: credentials plus durable win/loss counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserEntity {
    /// Unique login name.
    pub username: String,
    /// Argon2 PHC string.
    pub password_hash: String,
    /// Matches won.
    #[serde(default)]
    pub wins: i64,
    /// Matches lost.
    #[serde(default)]
    pub losses: i64,
}

impl UserEntity {
    /// New account with zeroed counters.
    pub fn new(username: String, password_hash: String) -> Self {
        Self {
            username,
            password_hash,
            wins: 0,
            losses: 0,
        }
    }

    /// Counters as a domain value, clamping anything a database could hold but we
    /// never write (negative or oversized).
    pub fn stats(&self) -> StatsRecord {
        StatsRecord {
            wins: clamp_counter(self.wins),
            losses: clamp_counter(self.losses),
        }
    }
}

fn clamp_counter(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

/// One entry of the durable move log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlacementEntity {
    /// Cell number `1..=9`.
    pub position: u8,
    /// `"x"` or `"o"`.
    pub symbol: String,
}

impl From<Placement> for PlacementEntity {
    fn from(value: Placement) -> Self {
        Self {
            position: value.position.get(),
            symbol: value.symbol.as_str().to_owned(),
        }
    }
}

impl TryFrom<PlacementEntity> for Placement {
    type Error = StorageError;

    fn try_from(value: PlacementEntity) -> Result<Self, Self::Error> {
        let position = Position::new(value.position).ok_or_else(|| {
            StorageError::InvalidRecord(format!("position {} out of range", value.position))
        })?;
        let symbol = Symbol::parse(&value.symbol).ok_or_else(|| {
            StorageError::InvalidRecord(format!("unknown symbol `{}`", value.symbol))
        })?;
        Ok(Placement { position, symbol })
    }
}

/// Chat line as stored by the durable chat log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatEntryEntity {
    /// Username of the sender.
    pub username: String,
    /// Message body.
    pub text: String,
    /// Acceptance time.
    pub created_at: SystemTime,
}

impl From<ChatEntry> for ChatEntryEntity {
    fn from(value: ChatEntry) -> Self {
        Self {
            username: value.author,
            text: value.text,
            created_at: value.timestamp,
        }
    }
}

impl From<ChatEntryEntity> for ChatEntry {
    fn from(value: ChatEntryEntity) -> Self {
        Self {
            author: value.username,
            text: value.text,
            timestamp: value.created_at,
        }
    }
}
