mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use rouse_api::auth::{AppState, AppStateInner};
use rouse_core::LogNotifier;
use rouse_core::delivery::spawn_delivery;
use rouse_crypto::password::Argon2Passwords;
use rouse_db::{Database, Repositories};
use rouse_session::reaper::spawn_reaper;
use rouse_types::clock::SystemClock;

use crate::config::{Config, Storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rouse=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let repos = match config.storage {
        Storage::Sqlite => {
            let db = Database::open(&config.db_path)?;
            info!("Using SQLite storage at {}", config.db_path.display());
            Repositories::sqlite(Arc::new(db))
        }
        Storage::Memory => {
            info!("Using in-memory storage; data is lost on exit");
            Repositories::in_memory()
        }
    };

    let state: AppState = Arc::new(AppStateInner::new(
        repos,
        Arc::new(Argon2Passwords::default()),
        Arc::new(SystemClock),
        config.session_ttl,
        config.confirm_window,
        config.cookie_secure,
    ));

    let reaper = spawn_reaper(state.sessions.clone(), config.reaper_interval);
    let delivery = spawn_delivery(
        state.morning_calls.clone(),
        Arc::new(LogNotifier),
        config.delivery_interval,
    );

    let app = rouse_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Rouse server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Stopping background tasks");
    reaper.shutdown().await;
    delivery.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
