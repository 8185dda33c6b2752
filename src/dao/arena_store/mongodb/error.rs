use mongodb::error::Error as MongoError;
use thiserror::Error;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB database `{database}` did not answer the connection ping")]
    InitialPing {
        database: String,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to load user `{username}`")]
    LoadUser {
        username: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to create user `{username}`")]
    CreateUser {
        username: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to update stats of `{username}`")]
    UpdateStats {
        username: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to write to collection `{collection}`")]
    Write {
        collection: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to read collection `{collection}`")]
    Read {
        collection: &'static str,
        #[source]
        source: MongoError,
    },
}
