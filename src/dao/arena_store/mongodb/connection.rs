use mongodb::{Client, Database, bson::doc};

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult},
};

/// Open the configured database and confirm it answers a single ping.
///
/// No retry happens here: `storage_supervisor` owns the backoff between attempts.
pub async fn open_database(config: &MongoConfig) -> MongoResult<Database> {
    let client = Client::with_options(config.options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(&config.database_name);

    database
        .run_command(doc! { "ping": 1 })
        .await
        .map_err(|source| MongoDaoError::InitialPing {
            database: config.database_name.clone(),
            source,
        })?;

    Ok(database)
}
