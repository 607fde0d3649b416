//! Balderdash Back binary entrypoint wiring the REST API, the round engine and the session store.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use balderdash_back::{
    config::AppConfig,
    dao::session_store::{SessionStore, memory::MemorySessionStore},
    routes,
    services::storage_supervisor,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let app_state = AppState::with_config(AppConfig::load());
    spawn_storage_supervisor(app_state.clone());

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

/// Pick the session store backend and keep it supervised in the background.
///
/// CouchDB is used when `COUCH_BASE_URL` is set, otherwise sessions live in memory.
fn spawn_storage_supervisor(state: SharedState) {
    if env::var_os("COUCH_BASE_URL").is_some() && spawn_couch_supervisor(&state) {
        return;
    }

    let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
    tokio::spawn(storage_supervisor::run(state, "memory", move || {
        let store = store.clone();
        async move { Ok(store) }
    }));
}

#[cfg(feature = "couch-store")]
fn spawn_couch_supervisor(state: &SharedState) -> bool {
    use balderdash_back::dao::{
        session_store::couchdb::{CouchConfig, CouchSessionStore},
        storage::StorageError,
    };

    let config = match CouchConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid CouchDB configuration; using the in-memory store");
            return false;
        }
    };

    tokio::spawn(storage_supervisor::run(state.clone(), "couchdb", move || {
        let config = config.clone();
        async move {
            let store = CouchSessionStore::connect(config)
                .await
                .map_err(StorageError::from)?;
            Ok(Arc::new(store) as Arc<dyn SessionStore>)
        }
    }));
    true
}

#[cfg(not(feature = "couch-store"))]
fn spawn_couch_supervisor(_state: &SharedState) -> bool {
    error!("COUCH_BASE_URL is set but the couch-store feature is disabled; using the in-memory store");
    false
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
                error!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
