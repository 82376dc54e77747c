//! Tactics Back binary entrypoint wiring the REST API to the puzzle store.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tactics_back::{
    config::AppConfig,
    dao::{
        catalog::{read_catalog, seed_store},
        models::PuzzleEntity,
        puzzle_store::memory::MemoryPuzzleStore,
    },
    routes,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let app_state = AppState::new(config);

    let catalog = read_configured_catalog(&app_state)?;
    match env::var("MONGO_URI").ok().filter(|uri| !uri.is_empty()) {
        Some(_) => spawn_mongo_supervisor(app_state.clone(), catalog).await?,
        None => install_memory_store(&app_state, catalog).await?,
    }

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

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

/// Read the configured catalog once so an invalid file aborts startup.
fn read_configured_catalog(state: &SharedState) -> anyhow::Result<Vec<PuzzleEntity>> {
    match &state.config().catalog_path {
        Some(path) => read_catalog(path, &state.config().rating)
            .with_context(|| format!("reading catalog from {}", path.display())),
        None => {
            warn!("no catalog configured; only puzzles already stored can be served");
            Ok(Vec::new())
        }
    }
}

async fn install_memory_store(
    state: &SharedState,
    catalog: Vec<PuzzleEntity>,
) -> anyhow::Result<()> {
    let store = MemoryPuzzleStore::new();
    seed_store(&store, catalog)
        .await
        .context("seeding the in-memory store")?;
    state.set_store(Arc::new(store), "memory").await;
    info!("using in-memory puzzle store");
    Ok(())
}

#[cfg(feature = "mongo-store")]
async fn spawn_mongo_supervisor(
    state: SharedState,
    catalog: Vec<PuzzleEntity>,
) -> anyhow::Result<()> {
    use tactics_back::{
        dao::{
            puzzle_store::{
                PuzzleStore,
                mongodb::{MongoConfig, MongoPuzzleStore},
            },
            storage::StorageError,
        },
        services::storage_supervisor,
    };

    let config = MongoConfig::from_env()
        .await
        .context("reading MongoDB configuration")?;

    // Seeding runs on every connect; puzzles already stored are skipped.
    tokio::spawn(storage_supervisor::run(state, "mongodb", move || {
        let config = config.clone();
        let catalog = catalog.clone();
        async move {
            let store = MongoPuzzleStore::connect(config)
                .await
                .map_err(StorageError::from)?;
            let store: Arc<dyn PuzzleStore> = Arc::new(store);
            seed_store(store.as_ref(), catalog).await?;
            Ok(store)
        }
    }));
    Ok(())
}

#[cfg(not(feature = "mongo-store"))]
async fn spawn_mongo_supervisor(
    _state: SharedState,
    _catalog: Vec<PuzzleEntity>,
) -> anyhow::Result<()> {
    anyhow::bail!("MONGO_URI is set but the binary was built without the `mongo-store` feature")
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
