//! Tictac Back binary entrypoint wiring REST, WebSocket and storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tictac_back::{
    config::AppConfig,
    dao::{
        arena_store::{ArenaStore, memory::MemoryArenaStore},
        storage::StorageError,
    },
    routes,
    services::{persistence, storage_supervisor},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let (app_state, durable_queue) = AppState::new(config);

    tokio::spawn(persistence::run(app_state.clone(), durable_queue));
    spawn_storage_supervisor(app_state.clone());

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Pick the storage backend from the environment and hand it to the supervisor.
///
/// `MONGO_URI` selects MongoDB; without it the process keeps everything in memory.
fn spawn_storage_supervisor(state: SharedState) {
    #[cfg(feature = "mongo-store")]
    {
        if let Ok(uri) = env::var("MONGO_URI") {
            use tictac_back::dao::arena_store::mongodb::{MongoArenaStore, MongoConfig};

            let db_name = env::var("MONGO_DB").ok();
            info!("using MongoDB storage backend");
            tokio::spawn(storage_supervisor::run(state, move || {
                let uri = uri.clone();
                let db_name = db_name.clone();
                async move {
                    let config = MongoConfig::from_uri(&uri, db_name.as_deref()).await?;
                    let store = MongoArenaStore::connect(config).await?;
                    Ok::<Arc<dyn ArenaStore>, StorageError>(Arc::new(store))
                }
            }));
            return;
        }
    }

    info!("MONGO_URI not set; using in-memory storage backend");
    let store = MemoryArenaStore::new();
    tokio::spawn(storage_supervisor::run(state, move || {
        let store = store.clone();
        async move { Ok::<Arc<dyn ArenaStore>, StorageError>(Arc::new(store)) }
    }));
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
