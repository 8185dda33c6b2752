use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Collection, Database,
    bson::doc,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::IndexOptions,
};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::open_database,
    error::{MongoDaoError, MongoResult},
    models::{MongoChatDocument, MongoMoveDocument},
};
use crate::dao::{
    arena_store::ArenaStore,
    models::{ChatEntryEntity, PlacementEntity, UserEntity},
    storage::StorageResult,
};
use crate::state::arena::StatsRecord;

const USER_COLLECTION_NAME: &str = "users";
const MOVE_COLLECTION_NAME: &str = "moves";
const CHAT_COLLECTION_NAME: &str = "chat_messages";
const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Clone)]
pub struct MongoArenaStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let database = open_database(&self.config).await?;
        self.state.write().await.database = database;
        Ok(())
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}

impl MongoArenaStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let database = open_database(&config).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let users = self.users().await;
        let index = mongodb::IndexModel::builder()
            .keys(doc! {"username": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("user_username_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();

        users
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: USER_COLLECTION_NAME,
                index: "username",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn users(&self) -> Collection<UserEntity> {
        self.database()
            .await
            .collection::<UserEntity>(USER_COLLECTION_NAME)
    }

    async fn moves(&self) -> Collection<MongoMoveDocument> {
        self.database()
            .await
            .collection::<MongoMoveDocument>(MOVE_COLLECTION_NAME)
    }

    async fn chat(&self) -> Collection<MongoChatDocument> {
        self.database()
            .await
            .collection::<MongoChatDocument>(CHAT_COLLECTION_NAME)
    }

    async fn find_user(&self, username: String) -> MongoResult<Option<UserEntity>> {
        self.users()
            .await
            .find_one(doc! { "username": &username })
            .await
            .map_err(|source| MongoDaoError::LoadUser { username, source })
    }

    async fn create_user(&self, user: UserEntity) -> MongoResult<bool> {
        match self.users().await.insert_one(&user).await {
            Ok(_) => Ok(true),
            Err(err) if is_duplicate_key(&err) => Ok(false),
            Err(source) => Err(MongoDaoError::CreateUser {
                username: user.username,
                source,
            }),
        }
    }

    async fn increment(&self, username: String, field: &'static str) -> MongoResult<()> {
        self.users()
            .await
            .update_one(
                doc! { "username": &username },
                doc! { "$inc": { field: 1_i64 } },
            )
            .await
            .map_err(|source| MongoDaoError::UpdateStats { username, source })?;
        Ok(())
    }

    async fn append_placement(&self, placement: PlacementEntity) -> MongoResult<()> {
        let document: MongoMoveDocument = placement.into();
        self.moves()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: MOVE_COLLECTION_NAME,
                source,
            })?;
        Ok(())
    }

    async fn fetch_placements(&self) -> MongoResult<Vec<PlacementEntity>> {
        let documents: Vec<MongoMoveDocument> = self
            .moves()
            .await
            .find(doc! {})
            .sort(doc! { "_id": 1 })
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: MOVE_COLLECTION_NAME,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: MOVE_COLLECTION_NAME,
                source,
            })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn clear_placements(&self) -> MongoResult<()> {
        self.moves()
            .await
            .delete_many(doc! {})
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: MOVE_COLLECTION_NAME,
                source,
            })?;
        Ok(())
    }

    async fn append_chat(&self, entry: ChatEntryEntity) -> MongoResult<()> {
        let document: MongoChatDocument = entry.into();
        self.chat()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: CHAT_COLLECTION_NAME,
                source,
            })?;
        Ok(())
    }

    async fn fetch_chat(&self, limit: usize) -> MongoResult<Vec<ChatEntryEntity>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut documents: Vec<MongoChatDocument> = self
            .chat()
            .await
            .find(doc! {})
            .sort(doc! { "_id": -1 })
            .limit(limit)
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: CHAT_COLLECTION_NAME,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: CHAT_COLLECTION_NAME,
                source,
            })?;

        documents.reverse();
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn clear_chat(&self) -> MongoResult<()> {
        self.chat()
            .await
            .delete_many(doc! {})
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: CHAT_COLLECTION_NAME,
                source,
            })?;
        Ok(())
    }
}

impl ArenaStore for MongoArenaStore {
    fn find_user(&self, username: String) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_user(username).await.map_err(Into::into) })
    }

    fn create_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.create_user(user).await.map_err(Into::into) })
    }

    fn increment_wins(&self, username: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.increment(username, "wins").await.map_err(Into::into) })
    }

    fn increment_losses(&self, username: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .increment(username, "losses")
                .await
                .map_err(Into::into)
        })
    }

    fn fetch_stats(&self, username: String) -> BoxFuture<'static, StorageResult<Option<StatsRecord>>> {
        let store = self.clone();
        Box::pin(async move {
            let user = store.find_user(username).await?;
            Ok(user.as_ref().map(UserEntity::stats))
        })
    }

    fn append_placement(&self, placement: PlacementEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.append_placement(placement).await.map_err(Into::into) })
    }

    fn fetch_placements(&self) -> BoxFuture<'static, StorageResult<Vec<PlacementEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.fetch_placements().await.map_err(Into::into) })
    }

    fn clear_placements(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.clear_placements().await.map_err(Into::into) })
    }

    fn append_chat(&self, entry: ChatEntryEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.append_chat(entry).await.map_err(Into::into) })
    }

    fn fetch_chat(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<ChatEntryEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.fetch_chat(limit).await.map_err(Into::into) })
    }

    fn clear_chat(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.clear_chat().await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
