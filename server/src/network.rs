//! Server network manager driving the fixed-rate tick loop
//!
//! Each tick walks `Idle → Draining → Scheduling → Publishing → Idle`:
//! inbound datagrams are decoded and applied to sessions, one job per live
//! entity runs on the worker pool, timed-out sessions are swept, and the
//! merged snapshot is broadcast to every active session.

use log::{debug, error, info, warn};
use shared::{
    player_spawn_position, Clock, Disconnect, DisconnectReason, EntityKey, EntityKind,
    EntityState, Handshake, Message, NetworkEvent, NetworkManager, SessionId, Snapshot,
    TickSnapshot, Transport,
};
use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::ServerConfig;
use crate::error::{ServerError, SessionError};
use crate::replication::ReplicationState;
use crate::scheduler::JobScheduler;
use crate::session::{Departure, SessionManager, TouchOutcome};
use crate::simulation::{EntitySpawnPolicy, Job, PlayerIntent};

/// Events kept for `poll_events`; the oldest are dropped past this.
pub const MAX_PENDING_EVENTS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPhase {
    Idle,
    Draining,
    Scheduling,
    Publishing,
}

/// Counters for everything that is handled instead of propagated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub ticks: u64,
    pub messages_received: u64,
    pub protocol_errors: u64,
    pub invalid_handshakes: u64,
    pub rejected_full: u64,
    pub receive_failures: u64,
    pub send_failures: u64,
    pub job_faults: u64,
    pub sessions_timed_out: u64,
    pub snapshots_published: u64,
}

/// Authoritative server side of the protocol
pub struct ServerNetworkManager {
    config: ServerConfig,
    transport: Box<dyn Transport>,
    clock: Box<dyn Clock>,
    spawn_policy: Box<dyn EntitySpawnPolicy>,
    sessions: SessionManager,
    scheduler: JobScheduler,
    replication: ReplicationState,
    phase: TickPhase,
    events: VecDeque<NetworkEvent>,
    stats: NetworkStats,
}

impl ServerNetworkManager {
    pub fn new(
        config: ServerConfig,
        transport: Box<dyn Transport>,
        clock: Box<dyn Clock>,
        spawn_policy: Box<dyn EntitySpawnPolicy>,
    ) -> Result<Self, ServerError> {
        config.validate()?;
        let scheduler = JobScheduler::new(config.workers)?;

        Ok(Self {
            sessions: SessionManager::new(config.max_sessions),
            scheduler,
            replication: ReplicationState::new(),
            config,
            transport,
            clock,
            spawn_policy,
            phase: TickPhase::Idle,
            events: VecDeque::new(),
            stats: NetworkStats::default(),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn phase(&self) -> TickPhase {
        self.phase
    }

    /// The last published snapshot.
    pub fn snapshot(&self) -> Arc<TickSnapshot> {
        Arc::clone(self.replication.current())
    }

    /// Number of events waiting for `poll_events`.
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    fn push_event(&mut self, event: NetworkEvent) {
        if self.events.len() >= MAX_PENDING_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.transport.local_addr()?)
    }

    /// Runs one full tick and returns the snapshot it published.
    pub fn tick(&mut self) -> Arc<TickSnapshot> {
        let now = self.clock.now();

        self.phase = TickPhase::Draining;
        self.drain(now);

        self.phase = TickPhase::Scheduling;
        let previous = Arc::clone(self.replication.current());
        let tick = previous.tick() + 1;
        let jobs = self.build_jobs(&previous, tick);
        let results = self
            .scheduler
            .run_tick(&jobs, &previous, tick, self.config.dt());
        let departures = self
            .sessions
            .sweep_timeouts(now, self.config.session_timeout);
        let departed = self.handle_departures(departures);

        self.phase = TickPhase::Publishing;
        let (snapshot, report) =
            self.replication
                .merge(results, &departed, self.spawn_policy.as_mut());
        self.stats.job_faults += report.faults.len() as u64;
        self.publish(&snapshot);

        self.phase = TickPhase::Idle;
        self.stats.ticks += 1;

        if tick % 60 == 0 {
            debug!(
                "Tick {}: {} sessions ({} active), {} entities, {} jobs on {} workers",
                tick,
                self.sessions.len(),
                self.sessions.active_count(),
                snapshot.len(),
                jobs.len(),
                self.scheduler.workers()
            );
        }

        snapshot
    }

    /// Pulls datagrams until the transport is empty or the per-tick cap is hit.
    fn drain(&mut self, now: Duration) {
        for _ in 0..self.config.max_messages_per_tick {
            match self.transport.receive() {
                Ok(Some((peer, bytes))) => self.handle_datagram(peer, &bytes, now),
                Ok(None) => return,
                Err(e) => {
                    warn!("{}", e);
                    self.stats.receive_failures += 1;
                    return;
                }
            }
        }
        debug!(
            "Message cap of {} reached, deferring the rest to the next tick",
            self.config.max_messages_per_tick
        );
    }

    fn handle_datagram(&mut self, peer: SocketAddr, bytes: &[u8], now: Duration) {
        self.stats.messages_received += 1;
        match Message::decode(bytes) {
            Ok(message) => self.handle_message(peer, message, now),
            Err(e) => {
                debug!("Dropping datagram from {}: {}", peer, e);
                self.stats.protocol_errors += 1;
            }
        }
    }

    fn handle_message(&mut self, peer: SocketAddr, message: Message, now: Duration) {
        let message = match message {
            Message::Handshake(handshake) => return self.handle_handshake(peer, handshake, now),
            Message::Snapshot(_) => {
                warn!("Unexpected snapshot from {}", peer);
                self.stats.protocol_errors += 1;
                return;
            }
            other => other,
        };

        let Some(id) = self.sessions.find_by_peer(peer) else {
            debug!("{:?} from unknown peer {}", message.kind(), peer);
            self.stats.protocol_errors += 1;
            return;
        };

        match message {
            Message::Command(command) => {
                self.touch(id, now);
                if let Some(session) = self.sessions.get_mut(id) {
                    session.apply_command(&command);
                }
            }
            Message::Ping(ping) => {
                self.touch(id, now);
                if let Some(session) = self.sessions.get_mut(id) {
                    session.queue(Message::Ping(ping));
                }
            }
            Message::Disconnect(_) => {
                if let Some(departure) = self.sessions.close(id) {
                    self.handle_departures(vec![departure]);
                }
            }
            Message::Handshake(_) | Message::Snapshot(_) => {}
        }
    }

    fn handle_handshake(&mut self, peer: SocketAddr, handshake: Handshake, now: Duration) {
        match self.sessions.resolve_or_create(peer, &handshake, now) {
            Ok(resolution) => {
                let id = resolution.id();
                self.sessions.touch(id, now, true);
                if let Some(session) = self.sessions.get_mut(id) {
                    // Re-acknowledge retransmits, the first ack may have been lost
                    let ack = Handshake::accepted(session.player_id);
                    session.queue(Message::Handshake(ack));
                }
            }
            Err(e) => {
                let reason = match e {
                    SessionError::InvalidHandshake { .. } => {
                        self.stats.invalid_handshakes += 1;
                        DisconnectReason::Rejected
                    }
                    SessionError::ServerFull { .. } => {
                        self.stats.rejected_full += 1;
                        DisconnectReason::ServerFull
                    }
                };
                warn!("{}", e);
                let notice = Message::Disconnect(Disconnect {
                    player_id: 0,
                    reason,
                });
                self.send_direct(peer, &notice);
            }
        }
    }

    fn touch(&mut self, id: SessionId, now: Duration) {
        if let TouchOutcome::Activated { player_id } = self.sessions.touch(id, now, false) {
            self.push_event(NetworkEvent::PlayerJoined { player_id });
        }
    }

    /// Raises leave events and notifies departed peers; returns their session ids.
    fn handle_departures(&mut self, departures: Vec<Departure>) -> HashSet<SessionId> {
        let mut departed = HashSet::new();
        for departure in departures {
            let session = &departure.session;
            if departure.reason == DisconnectReason::TimedOut {
                self.stats.sessions_timed_out += 1;
                let notice = Message::Disconnect(Disconnect {
                    player_id: session.player_id,
                    reason: DisconnectReason::TimedOut,
                });
                self.send_direct(session.peer, &notice);
            }
            if departure.was_active {
                self.push_event(NetworkEvent::PlayerLeft {
                    player_id: session.player_id,
                    reason: departure.reason,
                });
            }
            departed.insert(session.id);
        }
        departed
    }

    /// One job per active player, then one per surviving non-player entity.
    fn build_jobs(&mut self, previous: &TickSnapshot, tick: u32) -> Vec<Job> {
        let mut jobs = Vec::with_capacity(previous.len() + self.sessions.len());

        for session in self.sessions.iter_mut().filter(|s| s.is_active()) {
            let key = EntityKey::new(EntityKind::Player, session.player_id);
            let entity = previous.get(key).cloned().unwrap_or_else(|| {
                EntityState::new(
                    EntityKind::Player,
                    session.player_id,
                    player_spawn_position(session.player_id),
                    Default::default(),
                    tick,
                )
                .with_owner(session.id)
            });
            let intent = PlayerIntent {
                direction: session.move_intent,
                action: session.take_action(),
            };
            jobs.push(Job::player(entity, intent));
        }

        for entity in previous.entities() {
            if entity.kind != EntityKind::Player {
                jobs.push(Job::npc(entity.clone()));
            }
        }
        jobs
    }

    /// Serializes the snapshot once and fans it out with any queued replies.
    fn publish(&mut self, snapshot: &TickSnapshot) {
        let message = Message::Snapshot(Snapshot {
            tick: snapshot.tick(),
            entities: snapshot.to_wire(),
        });
        let bytes = match message.encode() {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                error!("Failed to encode snapshot {}: {}", snapshot.tick(), e);
                None
            }
        };

        let transport = self.transport.as_mut();
        let stats = &mut self.stats;
        for session in self.sessions.iter_mut() {
            while let Some(reply) = session.outbound.pop_front() {
                match reply.encode() {
                    Ok(reply_bytes) => {
                        if send_counted(transport, stats, session.peer, &reply_bytes) {
                            session.packets_sent += 1;
                        }
                    }
                    Err(e) => error!("Failed to encode reply for {}: {}", session.id, e),
                }
            }

            if let (true, Some(bytes)) = (session.is_active(), bytes.as_ref()) {
                if send_counted(transport, stats, session.peer, bytes) {
                    session.packets_sent += 1;
                }
            }
        }

        self.stats.snapshots_published += 1;
        self.push_event(NetworkEvent::SnapshotApplied {
            tick: snapshot.tick(),
        });
    }

    fn send_direct(&mut self, peer: SocketAddr, message: &Message) {
        match message.encode() {
            Ok(bytes) => {
                send_counted(self.transport.as_mut(), &mut self.stats, peer, &bytes);
            }
            Err(e) => error!("Failed to encode {:?} for {}: {}", message.kind(), peer, e),
        }
    }

    /// Drains the event queue into the log.
    fn log_events(&mut self) {
        for event in self.poll_events() {
            match event {
                NetworkEvent::PlayerJoined { player_id } => info!("Player {} joined", player_id),
                NetworkEvent::PlayerLeft { player_id, reason } => {
                    info!("Player {} left: {:?}", player_id, reason)
                }
                NetworkEvent::SnapshotApplied { .. } => {}
            }
        }
    }

    /// Ticks at the configured rate until Ctrl+C.
    pub async fn run(&mut self) -> Result<(), ServerError> {
        let mut tick_interval = interval(self.config.tick_duration());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        info!(
            "Server running at {} Hz on {}",
            self.config.tick_rate,
            self.local_addr()?
        );

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    self.tick();
                    self.log_events();
                }
                _ = &mut shutdown => {
                    info!("Received Ctrl+C, shutting down");
                    break;
                }
            }
        }

        NetworkManager::shutdown(self);
        Ok(())
    }
}

/// Sends without propagating; a failed send only bumps a counter.
fn send_counted(
    transport: &mut dyn Transport,
    stats: &mut NetworkStats,
    peer: SocketAddr,
    bytes: &[u8],
) -> bool {
    match transport.send(peer, bytes) {
        Ok(()) => true,
        Err(e) => {
            debug!("{}", e);
            stats.send_failures += 1;
            false
        }
    }
}

impl NetworkManager for ServerNetworkManager {
    fn update(&mut self) {
        self.tick();
    }

    fn poll_events(&mut self) -> Vec<NetworkEvent> {
        self.events.drain(..).collect()
    }

    fn shutdown(&mut self) {
        let peers: Vec<(SocketAddr, u32)> = self
            .sessions
            .iter()
            .map(|s| (s.peer, s.player_id))
            .collect();
        for (peer, player_id) in peers {
            let notice = Message::Disconnect(Disconnect {
                player_id,
                reason: DisconnectReason::ServerShutdown,
            });
            self.send_direct(peer, &notice);
        }
        info!("Server shutdown complete, {} sessions notified", self.sessions.len());
    }
}
