use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

use crate::dao::models::{ChatEntryEntity, PlacementEntity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMoveDocument {
    position: i32,
    symbol: String,
    created_at: DateTime,
}

impl From<PlacementEntity> for MongoMoveDocument {
    fn from(value: PlacementEntity) -> Self {
        Self {
            position: i32::from(value.position),
            symbol: value.symbol,
            created_at: DateTime::now(),
        }
    }
}

impl From<MongoMoveDocument> for PlacementEntity {
    fn from(value: MongoMoveDocument) -> Self {
        Self {
            // Out-of-range values surface as invalid placements downstream.
            position: u8::try_from(value.position).unwrap_or(u8::MAX),
            symbol: value.symbol,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoChatDocument {
    username: String,
    text: String,
    created_at: DateTime,
}

impl From<ChatEntryEntity> for MongoChatDocument {
    fn from(value: ChatEntryEntity) -> Self {
        Self {
            username: value.username,
            text: value.text,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl From<MongoChatDocument> for ChatEntryEntity {
    fn from(value: MongoChatDocument) -> Self {
        Self {
            username: value.username,
            text: value.text,
            created_at: value.created_at.to_system_time(),
        }
    }
}
