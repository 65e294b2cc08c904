use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use forum_api::config::Config;
use forum_api::routes::router;
use forum_api::state::{AppState, AppStateInner};
use forum_api::sweeper::Sweeper;
use forum_db::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forum=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env();
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let db = Arc::new(Database::open(&config.db_path)?);
    let state: AppState = Arc::new(AppStateInner::new(db, config));

    let sweeper = Sweeper::start(
        state.sessions.clone(),
        state.limiter.clone(),
        state.config.session_sweep_interval,
    );

    let app = router(state.clone()).layer(TraceLayer::new_for_http());

    info!("Forum server listening on {}", addr);
    info!(
        "Sessions last {} h; {} credential requests per {:?} per client",
        state.sessions.ttl().num_hours(),
        state.config.rate_limit_max_requests,
        state.config.rate_limit_window
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => tokio::select! {
                _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
            },
            Err(e) => {
                warn!("Could not install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
