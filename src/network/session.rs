//! Match Session Management
//!
//! Binds two connections to one authoritative [`MatchState`]. Every
//! mutation of a match happens under that session's write lock, and the
//! resulting messages are broadcast before the lock is released, so both
//! clients always see mutations in the same order.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify, RwLock};
use tracing::{debug, error, info, warn};

use crate::core::rng::derive_match_seed;
use crate::game::action::Action;
use crate::game::rules::RulesConfig;
use crate::game::state::{Character, MatchError, MatchState, Slot, Snapshot, SubmitOutcome};
use crate::game::turn::TurnOutcome;
use crate::network::protocol::{ErrorCode, ServerMessage};

/// Unique session identifier (UUID bytes). Doubles as the match id.
pub type SessionId = [u8; 16];

/// Server-assigned connection identifier.
pub type ConnectionId = u64;

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting players / playing.
    Open,
    /// Everyone left; awaiting cleanup.
    Closed,
}

/// A connection seated in a session.
#[derive(Debug)]
pub struct SessionPlayer {
    /// Connection identifier.
    pub conn_id: ConnectionId,
    /// Seat.
    pub slot: Slot,
    /// When the seat was taken.
    pub joined_at: DateTime<Utc>,
    /// Message channel to this player.
    pub sender: mpsc::Sender<ServerMessage>,
    /// Fired when the channel is full and the connection should close.
    pub kick: Arc<Notify>,
}

impl SessionPlayer {
    /// Queue a message without waiting. A full channel kicks the player.
    fn deliver(&self, message: ServerMessage) {
        match self.sender.try_send(message) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => {
                warn!(conn_id = self.conn_id, slot = %self.slot, "outbound queue full, kicking");
                self.kick.notify_one();
            }
        }
    }
}

/// A match session.
pub struct MatchSession {
    /// Unique session identifier.
    pub id: SessionId,
    /// Current state.
    pub state: SessionState,
    /// Seated connections.
    players: BTreeMap<Slot, SessionPlayer>,
    /// Authoritative match.
    game: MatchState,
    /// When session was created.
    created_at: DateTime<Utc>,
}

impl MatchSession {
    /// Create a new session.
    pub fn new(id: SessionId, rules: RulesConfig) -> Self {
        Self {
            id,
            state: SessionState::Open,
            players: BTreeMap::new(),
            game: MatchState::with_rules(id, derive_match_seed(&id), rules),
            created_at: Utc::now(),
        }
    }

    /// Match id as a UUID string.
    pub fn match_id(&self) -> String {
        uuid::Uuid::from_bytes(self.id).to_string()
    }

    /// Seat a connection in the first free slot.
    pub fn add_player(
        &mut self,
        conn_id: ConnectionId,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<Slot, SessionError> {
        if self.slot_of(conn_id).is_some() {
            return Err(SessionError::AlreadyInSession);
        }
        let slot = Slot::BOTH
            .into_iter()
            .find(|slot| !self.players.contains_key(slot))
            .ok_or(SessionError::MatchFull)?;

        self.players.insert(slot, SessionPlayer {
            conn_id,
            slot,
            joined_at: Utc::now(),
            sender,
            kick: Arc::new(Notify::new()),
        });
        self.state = SessionState::Open;
        Ok(slot)
    }

    /// Unseat a connection. Its actor is reset and the remaining player is
    /// told. Returns the freed slot.
    pub fn remove_player(&mut self, conn_id: ConnectionId) -> Option<Slot> {
        let slot = self.slot_of(conn_id)?;
        let player = self.players.remove(&slot)?;

        let full_reset = self.game.reset_slot(slot);
        info!(
            match_id = %self.match_id(),
            %slot,
            full_reset,
            seated_secs = (Utc::now() - player.joined_at).num_seconds(),
            "player left"
        );

        if self.players.is_empty() {
            self.state = SessionState::Closed;
        } else {
            if full_reset {
                self.broadcast(ServerMessage::Reset);
            }
            self.broadcast_state();
        }
        Some(slot)
    }

    /// Slot held by a connection.
    pub fn slot_of(&self, conn_id: ConnectionId) -> Option<Slot> {
        self.players
            .values()
            .find(|p| p.conn_id == conn_id)
            .map(|p| p.slot)
    }

    /// Number of seated connections.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Both seats taken.
    pub fn is_full(&self) -> bool {
        self.players.len() >= Slot::BOTH.len()
    }

    /// When the session was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Authoritative match state.
    pub fn game(&self) -> &MatchState {
        &self.game
    }

    /// Current public snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.game.snapshot()
    }

    /// Pick a character and broadcast the new state.
    pub fn choose_character(&mut self, slot: Slot, character: &str) -> Result<(), MatchError> {
        let character: Character = character.parse()?;
        self.game.select_character(slot, character)?;
        debug!(match_id = %self.match_id(), %slot, character = character.as_str(), "character chosen");
        self.broadcast_state();
        Ok(())
    }

    /// Lock in a queue. Broadcasts the new state, or the resolved turn when
    /// this was the second lock-in.
    pub fn lock_in(&mut self, slot: Slot, actions: Vec<Action>) -> Result<(), MatchError> {
        // Second lock-in resolves; the opponent must still be seated
        let other = slot.other();
        if self.game.actor(other).locked && !self.players.contains_key(&other) {
            error!(match_id = %self.match_id(), %other, "locked slot has no connection");
            return Err(MatchError::Invariant(format!("slot {other} locked without a connection")));
        }

        match self.game.submit_queue(slot, actions)? {
            SubmitOutcome::Pending => {
                debug!(match_id = %self.match_id(), %slot, "locked in");
                self.broadcast_state();
            }
            SubmitOutcome::Resolved(result) => {
                info!(
                    match_id = %self.match_id(),
                    turn = result.turn,
                    frames = result.timeline.len(),
                    "turn resolved"
                );
                self.broadcast(ServerMessage::turn_resolved(self.snapshot(), &result));
                if let TurnOutcome::Ended { winner } = result.outcome {
                    info!(match_id = %self.match_id(), ?winner, "match ended");
                    self.broadcast(ServerMessage::MatchEnded { winner });
                }
            }
        }
        Ok(())
    }

    /// Reset the match, keeping seats.
    pub fn retry(&mut self, slot: Slot) {
        self.game.retry();
        info!(match_id = %self.match_id(), %slot, arena = ?self.game.arena, "match reset");
        self.broadcast(ServerMessage::Reset);
        self.broadcast_state();
    }

    /// Send the current snapshot to everyone.
    pub fn broadcast_state(&self) {
        self.broadcast(ServerMessage::State { snapshot: self.snapshot() });
    }

    /// Broadcast a message to all seated players. Never waits on a slow
    /// reader.
    pub fn broadcast(&self, message: ServerMessage) {
        for player in self.players.values() {
            player.deliver(message.clone());
        }
    }

    /// Send a message to one slot.
    pub fn send_to(&self, slot: Slot, message: ServerMessage) {
        if let Some(player) = self.players.get(&slot) {
            player.deliver(message);
        }
    }

    /// Signal fired when the player in `slot` stops draining its queue.
    pub fn kick_signal(&self, slot: Slot) -> Option<Arc<Notify>> {
        self.players.get(&slot).map(|p| p.kick.clone())
    }
}

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Both seats are taken.
    #[error("Match is full")]
    MatchFull,
    /// Connection already seated.
    #[error("Already in session")]
    AlreadyInSession,
    /// Connection has no session.
    #[error("Not in a match")]
    NotInMatch,
}

impl From<&SessionError> for ErrorCode {
    fn from(err: &SessionError) -> Self {
        match err {
            SessionError::MatchFull => ErrorCode::MatchFull,
            SessionError::AlreadyInSession => ErrorCode::InvalidMessage,
            SessionError::NotInMatch => ErrorCode::NotInMatch,
        }
    }
}

// =============================================================================
// SESSION MANAGER
// =============================================================================

/// Manages all active sessions.
pub struct SessionManager {
    /// Active sessions.
    sessions: RwLock<BTreeMap<SessionId, Arc<RwLock<MatchSession>>>>,
    /// Connection to session mapping.
    connections: RwLock<BTreeMap<ConnectionId, SessionId>>,
    /// Rules for new matches.
    rules: RulesConfig,
}

impl SessionManager {
    /// Create new session manager.
    pub fn new(rules: RulesConfig) -> Self {
        Self {
            sessions: RwLock::new(BTreeMap::new()),
            connections: RwLock::new(BTreeMap::new()),
            rules,
        }
    }

    /// Create a new, empty session.
    pub async fn create_session(&self) -> SessionId {
        let id = uuid::Uuid::new_v4().into_bytes();
        let session = MatchSession::new(id, self.rules);
        let mut sessions = self.sessions.write().await;
        sessions.insert(id, Arc::new(RwLock::new(session)));
        id
    }

    /// Get a session by ID.
    pub async fn get_session(&self, id: &SessionId) -> Option<Arc<RwLock<MatchSession>>> {
        let sessions = self.sessions.read().await;
        sessions.get(id).cloned()
    }

    /// Seat a connection in the first session with a free slot, creating
    /// one if none is open.
    pub async fn join(
        &self,
        conn_id: ConnectionId,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<(Arc<RwLock<MatchSession>>, Slot), SessionError> {
        if self.connections.read().await.contains_key(&conn_id) {
            return Err(SessionError::AlreadyInSession);
        }

        // Held across the scan so two joins cannot pick the same seat.
        // Busy sessions are skipped rather than awaited.
        let mut sessions = self.sessions.write().await;

        let mut seated = None;
        for session in sessions.values() {
            let Ok(mut guard) = session.try_write() else {
                continue;
            };
            if guard.state == SessionState::Open && !guard.is_full() {
                let slot = guard.add_player(conn_id, sender.clone())?;
                seated = Some((session.clone(), guard.id, slot));
                break;
            }
        }

        let (session, id, slot) = match seated {
            Some(found) => found,
            None => {
                let id = uuid::Uuid::new_v4().into_bytes();
                let mut fresh = MatchSession::new(id, self.rules);
                let slot = fresh.add_player(conn_id, sender)?;
                let session = Arc::new(RwLock::new(fresh));
                sessions.insert(id, session.clone());
                (session, id, slot)
            }
        };
        drop(sessions);

        self.connections.write().await.insert(conn_id, id);
        Ok((session, slot))
    }

    /// Session and slot for a connection.
    pub async fn session_for(
        &self,
        conn_id: ConnectionId,
    ) -> Result<(Arc<RwLock<MatchSession>>, Slot), SessionError> {
        let id = self
            .connections
            .read()
            .await
            .get(&conn_id)
            .copied()
            .ok_or(SessionError::NotInMatch)?;
        let session = self.get_session(&id).await.ok_or(SessionError::NotInMatch)?;
        let slot = session.read().await.slot_of(conn_id).ok_or(SessionError::NotInMatch)?;
        Ok((session, slot))
    }

    /// Unseat a connection from its session.
    pub async fn leave(&self, conn_id: ConnectionId) -> Option<Slot> {
        let id = self.connections.write().await.remove(&conn_id)?;
        let session = self.get_session(&id).await?;
        let mut session = session.write().await;
        session.remove_player(conn_id)
    }

    /// Get active session count.
    pub async fn session_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }

    /// Get seated connection count.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Remove closed sessions.
    pub async fn cleanup(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let mut to_remove = Vec::new();

        for (id, session) in sessions.iter() {
            // Busy sessions are in use
            let Ok(s) = session.try_read() else {
                continue;
            };
            if s.state == SessionState::Closed {
                to_remove.push(*id);
            }
        }

        for id in &to_remove {
            sessions.remove(id);
        }
        to_remove.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(RulesConfig::default())
    }
}
