//! Olympia Back binary entrypoint wiring REST, SSE and the live store.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use olympia_back::{
    config::AppConfig,
    dao::live_store::memory::MemoryLiveStore,
    routes,
    services::access::ConfigAccessControl,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let access = Arc::new(ConfigAccessControl::new(config.moderators.clone()));
    let app_state = AppState::new(config, access);

    install_live_store(&app_state).await;
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

/// Supervise MongoDB when `MONGO_URI` is set, otherwise run on the in-memory store.
#[cfg(feature = "mongo-store")]
async fn install_live_store(state: &SharedState) {
    use olympia_back::{
        dao::{
            live_store::{
                LiveStore,
                mongodb::{MongoConfig, MongoLiveStore},
            },
            storage::StorageError,
        },
        services::storage_supervisor,
    };

    if env::var("MONGO_URI").is_err() {
        warn!("MONGO_URI not set; live state is kept in memory only");
        state.install_store(Arc::new(MemoryLiveStore::new())).await;
        return;
    }

    tokio::spawn(storage_supervisor::run(state.clone(), || async {
        let config = MongoConfig::from_env().await?;
        let store = MongoLiveStore::connect(config).await?;
        Ok::<Arc<dyn LiveStore>, StorageError>(Arc::new(store))
    }));
}

#[cfg(not(feature = "mongo-store"))]
async fn install_live_store(state: &SharedState) {
    warn!("built without a database backend; live state is kept in memory only");
    state.install_store(Arc::new(MemoryLiveStore::new())).await;
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
                warn!(error = %err, "could not install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
