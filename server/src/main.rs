use std::sync::Arc;

use anyhow::Context;
use axum::routing::get;
use axum::Router;
use soaring_server::config::ServerConfig;
use soaring_server::game_loop::{run_game_loop, GameCommand, ReportFrame};
use soaring_server::ws::{ws_handler, AppState};
use tokio::sync::{broadcast, mpsc, Semaphore};
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = ServerConfig::default_path();
    let mut config = ServerConfig::load(config_path.as_deref()).context("loading config")?;
    config.resolve_terrain().context("loading terrain")?;

    // Validate configuration before starting
    config.validate().context("invalid server configuration")?;

    let listen_addr = config.listen_addr.clone();

    let (game_tx, game_rx) = mpsc::channel::<GameCommand>(256);
    let (broadcast_tx, _) = broadcast::channel::<ReportFrame>(16);

    let app_state = AppState {
        game_tx,
        broadcast_tx: broadcast_tx.clone(),
        connection_semaphore: Arc::new(Semaphore::new(config.max_connections)),
        max_message_bytes: config.max_message_bytes,
    };

    // Spawn game loop
    tokio::spawn(async move {
        run_game_loop(game_rx, broadcast_tx, config).await;
    });

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    tracing::info!("Starting soaring server on {}", listen_addr);

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("binding {listen_addr}"))?;
    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}
