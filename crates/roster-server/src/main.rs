use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use roster_api::auth::{AppState, AppStateInner};
use roster_api::config::{AppConfig, StoreKind};
use roster_api::moderation::{ModerationService, SystemClock};
use roster_db::{Database, MemoryStore, UserStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roster=debug,roster_api=debug,roster_db=debug,tower_http=debug".into()),
        )
        .init();

    let config = AppConfig::from_env()?;

    // The store lives for the whole process and is handed to the service
    let store: Arc<dyn UserStore> = match config.store {
        StoreKind::Sqlite => Arc::new(Database::open(&config.db_path)?),
        StoreKind::Memory => {
            info!("Using in-memory store; accounts are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    if config.master_key.is_none() {
        info!("ROSTER_MASTER_KEY not set; promote and clear are disabled");
    }
    info!("Admin policy: {:?}", config.admin_policy);

    let moderation = ModerationService::new(
        store,
        Arc::new(SystemClock),
        config.admin_policy.clone(),
        config.master_key.clone(),
    );
    let state: AppState = Arc::new(AppStateInner {
        moderation,
        jwt_secret: config.jwt_secret.clone(),
        dev_mode: config.dev_mode,
    });

    let app = roster_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Roster listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
