//! Arena Duel Server
//!
//! Binary entry point: reads configuration from the environment and serves
//! WebSocket duels until Ctrl-C.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use arena_duel::{
    network::{GameServer, ServerConfig},
    VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;
    info!("Arena Duel Server v{}", VERSION);
    info!(
        max_connections = config.max_connections,
        idle_timeout_secs = config.idle_timeout.as_secs(),
        "Board {}x{}, {} hp, {} actions per turn",
        config.rules.board.width,
        config.rules.board.height,
        config.rules.max_hp,
        arena_duel::game::QUEUE_LEN,
    );

    let server = Arc::new(GameServer::new(config));

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            signal_server.shutdown();
        }
    });

    server.run().await?;
    info!("Server stopped");
    Ok(())
}
