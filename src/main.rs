//! Live match companion binary entrypoint wiring REST, SSE, the provider client
//! and the chat store.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "couch-store")]
use live_match_companion::{
    dao::{
        chat_store::ChatStore,
        couchdb::{CouchChatStore, CouchClient, CouchConfig, CouchDurableCache},
        storage::StorageError,
    },
    services::storage_supervisor,
};
use live_match_companion::{
    cache::{DurableCache, MemoryDurableCache},
    config::AppConfig,
    dao::chat_store::memory::MemoryChatStore,
    provider::ApiFootballClient,
    routes,
    services::presence_service::SWEEP_INTERVAL,
    state::{AppState, SharedState, store::StoreHandle},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let api_key = env::var("PROVIDER_API_KEY").unwrap_or_else(|_| {
        warn!("PROVIDER_API_KEY not set; provider requests will be rejected");
        String::new()
    });
    let provider = ApiFootballClient::new(&config.provider_base_url, &api_key)
        .context("building provider client")?;

    let (store, durable) = init_storage().await;
    let app_state = AppState::new(config, Arc::new(provider), durable, store);
    tokio::spawn(app_state.presence().clone().run_sweeper(SWEEP_INTERVAL));

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

fn in_process_storage() -> (StoreHandle, Arc<dyn DurableCache>) {
    (
        StoreHandle::with_store(Arc::new(MemoryChatStore::new())),
        Arc::new(MemoryDurableCache::new()),
    )
}

#[cfg(not(feature = "couch-store"))]
async fn init_storage() -> (StoreHandle, Arc<dyn DurableCache>) {
    info!("built without CouchDB support; using the in-process store");
    in_process_storage()
}

/// Pick the storage backends. With CouchDB settings the chat store is
/// supervised in the background (degraded until it connects); otherwise
/// everything stays in process.
#[cfg(feature = "couch-store")]
async fn init_storage() -> (StoreHandle, Arc<dyn DurableCache>) {
    let couch = match CouchConfig::from_env() {
        Ok(couch) => couch,
        Err(err) => {
            info!(reason = %err, "CouchDB not configured; using the in-process store");
            return in_process_storage();
        }
    };

    let handle = StoreHandle::new();
    let supervised = couch.clone();
    tokio::spawn(storage_supervisor::run(handle.clone(), move || {
        let config = supervised.clone();
        async move {
            let client = CouchClient::connect(config).await.map_err(StorageError::from)?;
            Ok(Arc::new(CouchChatStore::new(client)) as Arc<dyn ChatStore>)
        }
    }));

    let durable: Arc<dyn DurableCache> = match CouchClient::connect(couch).await {
        Ok(client) => Arc::new(CouchDurableCache::new(client)),
        Err(err) => {
            warn!(error = %err, "CouchDB unreachable for the cache; using process memory");
            Arc::new(MemoryDurableCache::new())
        }
    };

    (handle, durable)
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
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
