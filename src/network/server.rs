//! WebSocket Game Server
//!
//! Async WebSocket server for duel connections. Seats each connection in a
//! match, routes its messages into the session and cleans up on
//! disconnect. Holds no rules logic.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, Notify, RwLock};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::game::rules::RulesConfig;
use crate::network::protocol::{ClientMessage, ErrorCode, ServerMessage};
use crate::network::session::{ConnectionId, SessionError, SessionManager};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Close a connection after this long without a message.
    pub idle_timeout: Duration,
    /// Server version string.
    pub version: String,
    /// Rules for new matches.
    pub rules: RulesConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            version: env!("CARGO_PKG_VERSION").to_string(),
            rules: RulesConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Read `BIND_ADDR`, `PORT`, `MAX_CONNECTIONS` and `IDLE_TIMEOUT_SECS`.
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ServerConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("BIND_ADDR") {
            let ip: IpAddr = value
                .parse()
                .map_err(|_| ConfigError::Invalid { name: "BIND_ADDR", value })?;
            config.bind_addr.set_ip(ip);
        }
        if let Some(value) = lookup("PORT") {
            let port: u16 = value
                .parse()
                .map_err(|_| ConfigError::Invalid { name: "PORT", value })?;
            config.bind_addr.set_port(port);
        }
        if let Some(value) = lookup("MAX_CONNECTIONS") {
            config.max_connections = value
                .parse()
                .map_err(|_| ConfigError::Invalid { name: "MAX_CONNECTIONS", value })?;
        }
        if let Some(value) = lookup("IDLE_TIMEOUT_SECS") {
            let secs: u64 = value
                .parse()
                .map_err(|_| ConfigError::Invalid { name: "IDLE_TIMEOUT_SECS", value })?;
            config.idle_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Variable present but unparseable.
    #[error("Invalid value for {name}: {value:?}")]
    Invalid {
        /// Variable name
        name: &'static str,
        /// Raw value
        value: String,
    },
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Session error.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Connected client bookkeeping.
struct ConnectedClient {
    /// Peer address.
    addr: SocketAddr,
    /// Connection time.
    connected_at: DateTime<Utc>,
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Session manager.
    sessions: Arc<SessionManager>,
    /// Connected clients.
    clients: Arc<RwLock<BTreeMap<ConnectionId, ConnectedClient>>>,
    /// Connection id counter.
    next_conn_id: AtomicU64,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            sessions: Arc::new(SessionManager::new(config.rules)),
            config,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            next_conn_id: AtomicU64::new(1),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Game server v{} listening on {}", self.config.version, self.config.bind_addr);
        self.serve(listener).await
    }

    /// Serve on an already-bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        let cleanup_sessions = self.sessions.clone();
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_sessions).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
                            info!(conn_id, "New connection from {}", addr);
                            self.handle_connection(stream, addr, conn_id);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        cleanup_handle.abort();
        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr, conn_id: ConnectionId) {
        let clients = self.clients.clone();
        let sessions = self.sessions.clone();
        let idle_timeout = self.config.idle_timeout;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            clients.write().await.insert(conn_id, ConnectedClient {
                addr,
                connected_at: Utc::now(),
            });

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            // Seat the connection
            let kick = match sessions.join(conn_id, msg_tx.clone()).await {
                Ok((session, slot)) => {
                    let session = session.read().await;
                    info!(conn_id, match_id = %session.match_id(), %slot, "seated");
                    session.send_to(slot, ServerMessage::YouAre { slot, match_id: session.match_id() });
                    session.broadcast_state();
                    session.kick_signal(slot)
                }
                Err(e) => {
                    warn!(conn_id, "Could not seat {}: {}", addr, e);
                    reply(&msg_tx, ServerMessage::error(ErrorCode::from(&e), e.to_string()));
                    None
                }
            };

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::parse(&text) {
                                    Ok(m) => m,
                                    Err(err_reply) => {
                                        debug!(conn_id, "Invalid message from {}", addr);
                                        if !reply(&msg_tx, err_reply) {
                                            break;
                                        }
                                        continue;
                                    }
                                };

                                let keep_open = Self::handle_client_message(
                                    conn_id,
                                    client_msg,
                                    &sessions,
                                    &msg_tx,
                                ).await;
                                if !keep_open {
                                    break;
                                }
                            }
                            Some(Ok(Message::Binary(_))) => {
                                let sent = reply(&msg_tx, ServerMessage::error(
                                    ErrorCode::InvalidMessage,
                                    "Binary frames are not supported",
                                ));
                                if !sent {
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!(conn_id, "Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = kicked(kick.as_deref()) => {
                        warn!(conn_id, "Dropping slow client {}", addr);
                        break;
                    }
                    _ = tokio::time::sleep(idle_timeout) => {
                        info!(conn_id, "Closing idle connection {}", addr);
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        reply(&msg_tx, ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        });
                        break;
                    }
                }
            }

            // Free the seat before the channel goes away
            sessions.leave(conn_id).await;
            drop(msg_tx);
            // Let queued messages flush
            let _ = tokio::time::timeout(Duration::from_millis(100), sender_task).await;

            if let Some(client) = clients.write().await.remove(&conn_id) {
                let connected_for = Utc::now() - client.connected_at;
                info!(
                    conn_id,
                    connected_secs = connected_for.num_seconds(),
                    "Client {} cleaned up",
                    client.addr
                );
            }
        });
    }

    /// Handle a client message. Returns `false` when the connection should
    /// close.
    async fn handle_client_message(
        conn_id: ConnectionId,
        msg: ClientMessage,
        sessions: &Arc<SessionManager>,
        sender: &mpsc::Sender<ServerMessage>,
    ) -> bool {
        match msg {
            ClientMessage::Ping { timestamp } => {
                return reply(sender, ServerMessage::Pong {
                    timestamp,
                    server_time: Utc::now().timestamp_millis().max(0) as u64,
                });
            }
            ClientMessage::Leave => {
                debug!(conn_id, "leave requested");
                return false;
            }
            _ => {}
        }

        let (session, slot) = match sessions.session_for(conn_id).await {
            Ok(found) => found,
            Err(e) => {
                return reply(sender, ServerMessage::error(ErrorCode::from(&e), e.to_string()));
            }
        };

        let mut session = session.write().await;
        let result = match msg {
            ClientMessage::ChooseCharacter { character } => {
                session.choose_character(slot, &character)
            }
            ClientMessage::LockIn { actions } => session.lock_in(slot, actions),
            ClientMessage::Retry => {
                session.retry(slot);
                Ok(())
            }
            ClientMessage::Ping { .. } | ClientMessage::Leave => Ok(()),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                debug!(conn_id, %slot, "rejected: {}", e);
                reply(sender, ServerMessage::from(&e))
            }
        }
    }

    /// Periodically drop sessions everyone has left.
    async fn run_cleanup_loop(sessions: Arc<SessionManager>) {
        let mut interval = interval(Duration::from_secs(60));

        loop {
            interval.tick().await;
            let removed = sessions.cleanup().await;
            if removed > 0 {
                debug!(removed, "Removed closed sessions");
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Get active session count.
    pub async fn session_count(&self) -> usize {
        self.sessions.session_count().await
    }
}

/// Queue a direct reply without waiting. Returns `false` once the client
/// has stopped draining its queue.
fn reply(sender: &mpsc::Sender<ServerMessage>, message: ServerMessage) -> bool {
    !matches!(sender.try_send(message), Err(TrySendError::Full(_)))
}

/// Resolves when the seat's kick signal fires; never without a seat.
async fn kicked(kick: Option<&Notify>) {
    match kick {
        Some(kick) => kick.notified().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::Slot;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.idle_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_config_from_lookup() {
        let config = ServerConfig::from_lookup(|name| match name {
            "BIND_ADDR" => Some("127.0.0.1".into()),
            "PORT" => Some("9000".into()),
            "IDLE_TIMEOUT_SECS" => Some("15".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.idle_timeout, Duration::from_secs(15));
        assert_eq!(config.max_connections, 1000);
    }

    #[test]
    fn test_config_rejects_garbage() {
        let err = ServerConfig::from_lookup(|name| (name == "PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert_eq!(err, ConfigError::Invalid { name: "PORT", value: "http".into() });
    }

    #[test]
    fn test_reply_reports_full_queue() {
        let (tx, mut rx) = mpsc::channel(1);
        assert!(reply(&tx, ServerMessage::Reset));
        assert!(!reply(&tx, ServerMessage::Reset));
        assert_eq!(rx.try_recv().ok(), Some(ServerMessage::Reset));

        drop(rx);
        assert!(reply(&tx, ServerMessage::Reset));
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = GameServer::new(ServerConfig::default());
        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.session_count().await, 0);
        server.shutdown();
    }

    async fn start() -> (Arc<GameServer>, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(GameServer::new(ServerConfig::default()));
        let serving = server.clone();
        tokio::spawn(async move { serving.serve(listener).await });
        (server, addr)
    }

    async fn send(ws: &mut Client, json: &str) {
        ws.send(Message::Text(json.to_string())).await.unwrap();
    }

    /// Read until a message matches, skipping others.
    async fn recv_until<F>(ws: &mut Client, mut want: F) -> ServerMessage
    where
        F: FnMut(&ServerMessage) -> bool,
    {
        let deadline = Duration::from_secs(5);
        tokio::time::timeout(deadline, async {
            loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => {
                        let msg = ServerMessage::from_json(&text).unwrap();
                        if want(&msg) {
                            return msg;
                        }
                    }
                    Some(Ok(_)) => continue,
                    other => panic!("connection ended: {other:?}"),
                }
            }
        })
        .await
        .expect("timed out waiting for message")
    }

    #[tokio::test]
    async fn test_full_duel_over_websocket() {
        let (server, addr) = start().await;
        let url = format!("ws://{addr}");

        let (mut a, _) = connect_async(url.as_str()).await.unwrap();
        let seat = recv_until(&mut a, |m| matches!(m, ServerMessage::YouAre { .. })).await;
        assert!(matches!(seat, ServerMessage::YouAre { slot: Slot::P1, .. }));

        let (mut b, _) = connect_async(url.as_str()).await.unwrap();
        let seat = recv_until(&mut b, |m| matches!(m, ServerMessage::YouAre { .. })).await;
        assert!(matches!(seat, ServerMessage::YouAre { slot: Slot::P2, .. }));

        send(&mut a, r#"{"type":"choose_character","character":"fire"}"#).await;
        send(&mut b, r#"{"type":"choose_character","character":"fire"}"#).await;
        recv_until(&mut b, |m| {
            matches!(m, ServerMessage::State { snapshot } if snapshot.p1.character.is_some() && snapshot.p2.character.is_some())
        })
        .await;

        // Bad queue is rejected without a state change
        send(&mut a, r#"{"type":"lock_in","actions":[{"type":"attack"}]}"#).await;
        let err = recv_until(&mut a, |m| matches!(m, ServerMessage::Error { .. })).await;
        assert!(matches!(err, ServerMessage::Error { code: ErrorCode::InvalidQueue, .. }));

        let attacks = r#"{"type":"lock_in","actions":[{"type":"attack"},{"type":"attack"},{"type":"attack"}]}"#;
        send(&mut a, attacks).await;
        send(&mut b, attacks).await;

        for ws in [&mut a, &mut b] {
            let resolved = recv_until(ws, |m| matches!(m, ServerMessage::TurnResolved { .. })).await;
            let ServerMessage::TurnResolved { snapshot, timeline, .. } = resolved else {
                unreachable!()
            };
            assert_eq!(snapshot.turn, 2);
            assert_eq!(snapshot.p1.hp, 8);
            assert_eq!(snapshot.p2.hp, 8);
            assert_eq!(timeline.final_snapshot(), Some(&snapshot));
        }

        send(&mut a, r#"{"type":"ping","timestamp":7}"#).await;
        let pong = recv_until(&mut a, |m| matches!(m, ServerMessage::Pong { .. })).await;
        assert!(matches!(pong, ServerMessage::Pong { timestamp: 7, .. }));

        assert_eq!(server.connection_count().await, 2);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_leave_resets_opponent_view() {
        let (server, addr) = start().await;
        let url = format!("ws://{addr}");

        let (mut a, _) = connect_async(url.as_str()).await.unwrap();
        recv_until(&mut a, |m| matches!(m, ServerMessage::YouAre { .. })).await;
        let (mut b, _) = connect_async(url.as_str()).await.unwrap();
        recv_until(&mut b, |m| matches!(m, ServerMessage::YouAre { .. })).await;

        send(&mut a, r#"{"type":"choose_character","character":"wanderer"}"#).await;
        recv_until(&mut b, |m| {
            matches!(m, ServerMessage::State { snapshot } if snapshot.p1.character.is_some())
        })
        .await;

        send(&mut a, r#"{"type":"leave"}"#).await;
        recv_until(&mut b, |m| {
            matches!(m, ServerMessage::State { snapshot } if snapshot.p1.character.is_none())
        })
        .await;

        // Unknown character from the remaining player
        send(&mut b, r#"{"type":"choose_character","character":"knight"}"#).await;
        let err = recv_until(&mut b, |m| matches!(m, ServerMessage::Error { .. })).await;
        assert!(matches!(err, ServerMessage::Error { code: ErrorCode::UnknownCharacter, .. }));

        server.shutdown();
    }
}
