use std::time::Duration;

use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

const DEFAULT_DB: &str = "tictactoe";
/// Bound on one server selection so a single ping fails fast while storage is down.
const DEFAULT_SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(2);

/// Driver options plus the database holding users, moves and chat.
#[derive(Clone)]
pub struct MongoConfig {
    /// Parsed driver options.
    pub options: ClientOptions,
    /// Database name, `tictactoe` unless `MONGO_DB` says otherwise.
    pub database_name: String,
}

impl MongoConfig {
    /// Parse `uri`; an explicit `serverSelectionTimeoutMS` in the URI wins over the default.
    pub async fn from_uri(uri: &str, db_name: Option<&str>) -> MongoResult<Self> {
        let database_name = db_name
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_DB)
            .to_owned();
        let mut options =
            ClientOptions::parse(uri)
                .await
                .map_err(|source| MongoDaoError::InvalidUri {
                    uri: uri.to_owned(),
                    source,
                })?;
        options
            .server_selection_timeout
            .get_or_insert(DEFAULT_SERVER_SELECTION_TIMEOUT);

        Ok(Self {
            options,
            database_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults_database_and_selection_timeout() {
        let config = MongoConfig::from_uri("mongodb://localhost:27017", Some(""))
            .await
            .unwrap();
        assert_eq!(config.database_name, "tictactoe");
        assert_eq!(
            config.options.server_selection_timeout,
            Some(DEFAULT_SERVER_SELECTION_TIMEOUT)
        );
    }

    #[tokio::test]
    async fn uri_timeout_and_explicit_database_are_kept() {
        let config = MongoConfig::from_uri(
            "mongodb://localhost:27017/?serverSelectionTimeoutMS=500",
            Some("arena"),
        )
        .await
        .unwrap();
        assert_eq!(config.database_name, "arena");
        assert_eq!(
            config.options.server_selection_timeout,
            Some(Duration::from_millis(500))
        );
    }

    #[tokio::test]
    async fn malformed_uri_is_rejected() {
        let result = MongoConfig::from_uri("postgres://nope", None).await;
        assert!(matches!(result, Err(MongoDaoError::InvalidUri { .. })));
    }
}
