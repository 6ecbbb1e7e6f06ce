//! Session tracking and liveness for connected peers
//!
//! This module owns the server-side record of every peer that completed a
//! handshake:
//! - Session lifecycle (handshake, activation, timeout, explicit leave)
//! - The latest movement intent and pending action of each player
//! - Per-session outbound queue for replies that are not snapshots
//! - Packet counters for monitoring
//!
//! Sessions live in an arena keyed by [`SessionId`]; the peer address map is
//! only a secondary index into that arena.

use log::{debug, info};
use shared::{
    ActionKind, Command, DisconnectReason, Handshake, Intent, Message, SessionId, Vec2,
    PROTOCOL_VERSION,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake accepted, no other message seen yet.
    Connecting,
    /// Player entity exists and receives snapshots.
    Active,
    TimedOut,
    Closed,
}

/// Represents one connected peer and its player
#[derive(Debug)]
pub struct Session {
    /// Unique session identifier assigned by the server
    pub id: SessionId,
    /// Network address used for every reply
    pub peer: SocketAddr,
    /// Player identity, also the id of the player entity
    pub player_id: u32,
    /// Clock reading of the last valid message from this peer
    pub last_seen: Duration,
    pub state: ConnectionState,
    /// Held movement direction, applied every tick until replaced
    pub move_intent: Vec2,
    /// Action requested since the last scheduled tick
    pub pending_action: Option<ActionKind>,
    /// Highest command sequence applied so far
    pub last_command_sequence: u32,
    /// Replies waiting for the next publishing phase
    pub outbound: VecDeque<Message>,
    pub packets_received: u64,
    pub packets_sent: u64,
}

impl Session {
    /// Creates a session in the `Connecting` state, seen at `now`.
    pub fn new(id: SessionId, peer: SocketAddr, player_id: u32, now: Duration) -> Self {
        Self {
            id,
            peer,
            player_id,
            last_seen: now,
            state: ConnectionState::Connecting,
            move_intent: Vec2::ZERO,
            pending_action: None,
            last_command_sequence: 0,
            outbound: VecDeque::new(),
            packets_received: 0,
            packets_sent: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == ConnectionState::Active
    }

    /// Returns true if no valid message arrived within `timeout` of `now`.
    pub fn is_timed_out(&self, now: Duration, timeout: Duration) -> bool {
        now.saturating_sub(self.last_seen) > timeout
    }

    /// Records a command unless an equal or newer sequence was already applied.
    ///
    /// Datagrams may arrive out of order; a stale move intent must not
    /// overwrite a fresher one.
    pub fn apply_command(&mut self, command: &Command) -> bool {
        if command.sequence <= self.last_command_sequence {
            debug!(
                "{} ignoring stale command {} (last {})",
                self.id, command.sequence, self.last_command_sequence
            );
            return false;
        }
        self.last_command_sequence = command.sequence;

        match command.intent {
            Intent::Move { direction } => self.move_intent = direction,
            Intent::Action { action } => self.pending_action = Some(action),
        }
        true
    }

    pub fn take_action(&mut self) -> Option<ActionKind> {
        self.pending_action.take()
    }

    pub fn queue(&mut self, message: Message) {
        self.outbound.push_back(message);
    }
}

/// Outcome of a successful handshake lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Created(SessionId),
    /// The peer already had a session; the handshake was a retransmit.
    Existing(SessionId),
}

impl Resolution {
    pub fn id(&self) -> SessionId {
        match self {
            Resolution::Created(id) | Resolution::Existing(id) => *id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchOutcome {
    Refreshed,
    /// First non-handshake message: the session became `Active`.
    Activated { player_id: u32 },
    Unknown,
}

/// A session removed from the live set
#[derive(Debug)]
pub struct Departure {
    pub session: Session,
    pub reason: DisconnectReason,
    /// Whether the session had a player entity when it left
    pub was_active: bool,
}

/// Manages the live set of sessions
///
/// The SessionManager is the only owner of session records. It is mutated
/// exclusively from the single-threaded draining and sweep phases of a
/// tick, never while jobs are running.
pub struct SessionManager {
    /// Session arena indexed by stable id
    sessions: BTreeMap<SessionId, Session>,
    /// Secondary index from peer address into the arena
    by_peer: HashMap<SocketAddr, SessionId>,
    next_session_id: u32,
    next_player_id: u32,
    max_sessions: usize,
}

impl SessionManager {
    /// Creates an empty manager accepting up to `max_sessions` peers.
    ///
    /// Session and player ids start from 1 and are never reused.
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: BTreeMap::new(),
            by_peer: HashMap::new(),
            next_session_id: 1,
            next_player_id: 1,
            max_sessions,
        }
    }

    /// Looks up the session of `peer`, creating one for a valid handshake
    ///
    /// A peer that already has a session gets it back untouched, which makes
    /// retransmitted handshakes idempotent: no second session and no second
    /// player. An unseen peer needs a handshake with the current protocol
    /// version and a free slot.
    pub fn resolve_or_create(
        &mut self,
        peer: SocketAddr,
        handshake: &Handshake,
        now: Duration,
    ) -> Result<Resolution, SessionError> {
        if let Some(id) = self.by_peer.get(&peer) {
            return Ok(Resolution::Existing(*id));
        }

        if handshake.protocol_version != PROTOCOL_VERSION {
            return Err(SessionError::InvalidHandshake {
                peer,
                reason: format!(
                    "protocol version {} (expected {})",
                    handshake.protocol_version, PROTOCOL_VERSION
                ),
            });
        }
        if handshake.player_id != 0 {
            return Err(SessionError::InvalidHandshake {
                peer,
                reason: format!("join request claims player id {}", handshake.player_id),
            });
        }

        if self.sessions.len() >= self.max_sessions {
            return Err(SessionError::ServerFull {
                peer,
                max: self.max_sessions,
            });
        }

        let id = SessionId(self.next_session_id);
        self.next_session_id += 1;
        let player_id = self.next_player_id;
        self.next_player_id += 1;

        info!("{} connecting from {} as player {}", id, peer, player_id);
        self.sessions
            .insert(id, Session::new(id, peer, player_id, now));
        self.by_peer.insert(peer, id);

        Ok(Resolution::Created(id))
    }

    /// Refreshes liveness of a session after a valid message
    ///
    /// The first valid message that is not a handshake moves a `Connecting`
    /// session to `Active`.
    pub fn touch(&mut self, id: SessionId, now: Duration, is_handshake: bool) -> TouchOutcome {
        let Some(session) = self.sessions.get_mut(&id) else {
            return TouchOutcome::Unknown;
        };

        session.last_seen = session.last_seen.max(now);
        session.packets_received += 1;

        if !is_handshake && session.state == ConnectionState::Connecting {
            session.state = ConnectionState::Active;
            info!("{} active, player {} joined", id, session.player_id);
            return TouchOutcome::Activated {
                player_id: session.player_id,
            };
        }
        TouchOutcome::Refreshed
    }

    /// Removes every session silent for longer than `timeout`
    ///
    /// Runs once per tick. Returns the evicted sessions, already marked
    /// `TimedOut`, so their player entities can be destroyed.
    pub fn sweep_timeouts(&mut self, now: Duration, timeout: Duration) -> Vec<Departure> {
        let timed_out: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|session| session.is_timed_out(now, timeout))
            .map(|session| session.id)
            .collect();

        timed_out
            .into_iter()
            .filter_map(|id| self.remove(id, ConnectionState::TimedOut, DisconnectReason::TimedOut))
            .collect()
    }

    /// Ends a session at the client's request.
    pub fn close(&mut self, id: SessionId) -> Option<Departure> {
        self.remove(id, ConnectionState::Closed, DisconnectReason::ClientLeft)
    }

    fn remove(
        &mut self,
        id: SessionId,
        state: ConnectionState,
        reason: DisconnectReason,
    ) -> Option<Departure> {
        let mut session = self.sessions.remove(&id)?;
        self.by_peer.remove(&session.peer);

        let was_active = session.is_active();
        session.state = state;
        info!(
            "{} (player {}) removed: {:?}",
            id, session.player_id, reason
        );

        Some(Departure {
            session,
            reason,
            was_active,
        })
    }

    /// Finds the session bound to a peer address.
    pub fn find_by_peer(&self, peer: SocketAddr) -> Option<SessionId> {
        self.by_peer.get(&peer).copied()
    }

    /// Returns the session with `id`, if it is still live.
    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// Mutable access to a live session
    ///
    /// Used while draining to record intents and queue replies. Removed
    /// sessions are never handed out.
    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    /// Iterates sessions in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Iterates sessions mutably in id order
    ///
    /// Job building and publishing walk sessions through this, so the
    /// order of player jobs and outgoing datagrams is stable across ticks.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.values_mut()
    }

    /// Iterates the sessions that own a player and receive snapshots.
    pub fn active(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values().filter(|s| s.is_active())
    }

    /// Returns the number of `Active` sessions
    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    /// Returns the number of live sessions, connecting or active
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true when no session is live
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
