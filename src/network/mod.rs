//! Network Layer
//!
//! WebSocket server that seats two connections per match and relays their
//! submissions. This layer is **non-deterministic**; every rule decision
//! goes through `game/`.

pub mod protocol;
pub mod session;
pub mod server;

pub use protocol::{ClientMessage, ErrorCode, ServerMessage};
pub use session::{ConnectionId, MatchSession, SessionError, SessionId, SessionManager, SessionState};
pub use server::{ConfigError, GameServer, GameServerError, ServerConfig};
