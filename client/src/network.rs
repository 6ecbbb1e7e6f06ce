//! Headless client side of the protocol
//!
//! Drives the handshake, sends commands and pings, and keeps a
//! [`ClientWorldView`] in step with the server's snapshots.

use log::{debug, info, warn};
use shared::{
    ActionKind, Clock, Command, Disconnect, DisconnectReason, Handshake, Intent, Message,
    NetworkEvent, NetworkManager, Ping, Transport, Vec2,
};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ClientError;
use crate::game::ClientWorldView;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_HANDSHAKE_RETRY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: SocketAddr,
    /// Silence from the server after which the connection is given up.
    pub timeout: Duration,
    pub ping_interval: Duration,
    /// Delay before an unanswered handshake is sent again.
    pub handshake_retry: Duration,
}

impl ClientConfig {
    pub fn new(server_addr: SocketAddr) -> Self {
        Self {
            server_addr,
            timeout: DEFAULT_TIMEOUT,
            ping_interval: DEFAULT_PING_INTERVAL,
            handshake_retry: DEFAULT_HANDSHAKE_RETRY,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 8080)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub messages_received: u64,
    pub protocol_errors: u64,
    pub send_failures: u64,
    pub snapshots_applied: u64,
}

pub struct ClientNetworkManager {
    config: ClientConfig,
    transport: Box<dyn Transport>,
    clock: Box<dyn Clock>,
    state: ClientState,
    player_id: Option<u32>,
    view: ClientWorldView,
    next_sequence: u32,
    last_heard: Duration,
    last_handshake: Duration,
    last_ping: Duration,
    rtt: Option<Duration>,
    events: Vec<NetworkEvent>,
    stats: ClientStats,
}

impl ClientNetworkManager {
    pub fn new(config: ClientConfig, transport: Box<dyn Transport>, clock: Box<dyn Clock>) -> Self {
        Self {
            config,
            transport,
            clock,
            state: ClientState::Disconnected,
            player_id: None,
            view: ClientWorldView::new(),
            next_sequence: 1,
            last_heard: Duration::ZERO,
            last_handshake: Duration::ZERO,
            last_ping: Duration::ZERO,
            rtt: None,
            events: Vec::new(),
            stats: ClientStats::default(),
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Player id assigned by the server, once the handshake is acknowledged.
    pub fn player_id(&self) -> Option<u32> {
        self.player_id
    }

    pub fn view(&self) -> &ClientWorldView {
        &self.view
    }

    /// Round-trip time measured by the last answered ping.
    pub fn rtt(&self) -> Option<Duration> {
        self.rtt
    }

    pub fn stats(&self) -> &ClientStats {
        &self.stats
    }

    /// Starts (or restarts) the handshake.
    pub fn connect(&mut self) -> Result<(), ClientError> {
        let now = self.clock.now();
        info!("Connecting to {}", self.config.server_addr);

        self.state = ClientState::Connecting;
        self.player_id = None;
        self.view.clear();
        self.last_heard = now;
        self.last_handshake = now;
        self.send(&Message::Handshake(Handshake::request()))
    }

    pub fn send_move(&mut self, direction: Vec2) -> Result<(), ClientError> {
        self.send_command(Intent::Move { direction })
    }

    pub fn fire(&mut self) -> Result<(), ClientError> {
        self.send_command(Intent::Action {
            action: ActionKind::Fire,
        })
    }

    pub fn ping(&mut self) -> Result<(), ClientError> {
        let now = self.clock.now();
        self.last_ping = now;
        self.send(&Message::Ping(Ping {
            timestamp_ms: now.as_millis() as u64,
        }))
    }

    /// Tells the server this client is leaving.
    pub fn disconnect(&mut self) -> Result<(), ClientError> {
        let Some(player_id) = self.player_id else {
            self.state = ClientState::Disconnected;
            return Err(ClientError::NotConnected);
        };

        let result = self.send(&Message::Disconnect(Disconnect {
            player_id,
            reason: DisconnectReason::ClientLeft,
        }));
        self.drop_connection(DisconnectReason::ClientLeft);
        result
    }

    fn send_command(&mut self, intent: Intent) -> Result<(), ClientError> {
        if self.state != ClientState::Connected {
            return Err(ClientError::NotConnected);
        }
        let command = Command {
            sequence: self.next_sequence,
            intent,
        };
        self.next_sequence += 1;
        self.send(&Message::Command(command))
    }

    fn send(&mut self, message: &Message) -> Result<(), ClientError> {
        let bytes = message.encode()?;
        if let Err(e) = self.transport.send(self.config.server_addr, &bytes) {
            self.stats.send_failures += 1;
            return Err(e.into());
        }
        Ok(())
    }

    /// Drains the transport, then handles retries, pings and the timeout.
    pub fn poll(&mut self) {
        loop {
            match self.transport.receive() {
                Ok(Some((from, bytes))) => self.handle_datagram(from, &bytes),
                Ok(None) => break,
                Err(e) => {
                    warn!("{}", e);
                    break;
                }
            }
        }

        let now = self.clock.now();
        match self.state {
            ClientState::Disconnected => {}
            _ if now.saturating_sub(self.last_heard) > self.config.timeout => {
                warn!("No word from the server for {:?}, giving up", self.config.timeout);
                self.drop_connection(DisconnectReason::TimedOut);
            }
            ClientState::Connecting => {
                if now.saturating_sub(self.last_handshake) >= self.config.handshake_retry {
                    debug!("Handshake unanswered, retrying");
                    self.last_handshake = now;
                    if let Err(e) = self.send(&Message::Handshake(Handshake::request())) {
                        debug!("Handshake retry not sent: {}", e);
                    }
                }
            }
            ClientState::Connected => {
                if now.saturating_sub(self.last_ping) >= self.config.ping_interval {
                    if let Err(e) = self.ping() {
                        debug!("Ping not sent: {}", e);
                    }
                }
            }
        }
    }

    fn handle_datagram(&mut self, from: SocketAddr, bytes: &[u8]) {
        self.stats.messages_received += 1;
        if from != self.config.server_addr {
            debug!("Ignoring datagram from {}", from);
            self.stats.protocol_errors += 1;
            return;
        }

        let message = match Message::decode(bytes) {
            Ok(message) => message,
            Err(e) => {
                debug!("Dropping datagram from server: {}", e);
                self.stats.protocol_errors += 1;
                return;
            }
        };

        if self.state == ClientState::Disconnected {
            return;
        }
        self.last_heard = self.clock.now();

        match message {
            Message::Handshake(ack) => self.handle_ack(ack),
            Message::Snapshot(snapshot) => {
                let tick = snapshot.tick;
                if self.view.apply_snapshot(snapshot) {
                    self.stats.snapshots_applied += 1;
                    self.events.push(NetworkEvent::SnapshotApplied { tick });
                }
            }
            Message::Ping(ping) => {
                let now_ms = self.clock.now().as_millis() as u64;
                self.rtt = Some(Duration::from_millis(now_ms.saturating_sub(ping.timestamp_ms)));
            }
            Message::Disconnect(notice) => {
                warn!("Disconnected by server: {:?}", notice.reason);
                self.drop_connection(notice.reason);
            }
            Message::Command(_) => {
                self.stats.protocol_errors += 1;
            }
        }
    }

    fn handle_ack(&mut self, ack: Handshake) {
        if self.state != ClientState::Connecting || ack.player_id == 0 {
            return;
        }

        info!("Connected as player {}", ack.player_id);
        self.player_id = Some(ack.player_id);
        self.state = ClientState::Connected;
        self.events.push(NetworkEvent::PlayerJoined {
            player_id: ack.player_id,
        });
        // The server only activates a session on its first non-handshake message
        if let Err(e) = self.ping() {
            debug!("Activation ping not sent: {}", e);
        }
    }

    fn drop_connection(&mut self, reason: DisconnectReason) {
        if let Some(player_id) = self.player_id.take() {
            self.events
                .push(NetworkEvent::PlayerLeft { player_id, reason });
        }
        self.state = ClientState::Disconnected;
    }
}

impl NetworkManager for ClientNetworkManager {
    fn update(&mut self) {
        self.poll();
    }

    fn poll_events(&mut self) -> Vec<NetworkEvent> {
        std::mem::take(&mut self.events)
    }

    fn shutdown(&mut self) {
        if self.state != ClientState::Disconnected {
            if let Err(e) = self.disconnect() {
                debug!("Disconnect notice not sent: {}", e);
            }
        }
    }
}
