//! Connectionless datagram transport
//!
//! A [`Transport`] moves opaque byte payloads tagged with a peer address.
//! It has no notion of sessions and gives no delivery, ordering or
//! deduplication guarantees. `receive` never blocks: it returns at most one
//! pending datagram, or `None` when nothing is queued.

use log::{debug, warn};
use std::collections::{HashMap, VecDeque};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::net::UdpSocket;

use crate::error::TransportError;
use crate::protocol::MAX_DATAGRAM_SIZE;

pub type Datagram = (SocketAddr, Vec<u8>);

pub trait Transport: Send {
    /// Best-effort send. An `Ok` only means the datagram left this process.
    fn send(&mut self, peer: SocketAddr, bytes: &[u8]) -> Result<(), TransportError>;

    /// Polls for one pending datagram without blocking.
    fn receive(&mut self) -> Result<Option<Datagram>, TransportError>;

    fn local_addr(&self) -> Result<SocketAddr, TransportError>;
}

/// UDP transport over a tokio socket, polled with the non-blocking `try_*` calls.
///
/// The socket is registered with the tokio reactor, so it must be created and
/// used from inside a runtime that keeps being driven between polls.
pub struct UdpTransport {
    socket: UdpSocket,
    buffer: Vec<u8>,
}

impl UdpTransport {
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self {
            socket,
            buffer: vec![0u8; MAX_DATAGRAM_SIZE],
        })
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, peer: SocketAddr, bytes: &[u8]) -> Result<(), TransportError> {
        match self.socket.try_send_to(bytes, peer) {
            Ok(_) => Ok(()),
            Err(source) => Err(TransportError::Send { peer, source }),
        }
    }

    fn receive(&mut self) -> Result<Option<Datagram>, TransportError> {
        loop {
            match self.socket.try_recv_from(&mut self.buffer) {
                Ok((len, addr)) => return Ok(Some((addr, self.buffer[..len].to_vec()))),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                // ICMP port-unreachable from an earlier send surfaces here on some platforms
                Err(e) if e.kind() == ErrorKind::ConnectionReset => {
                    debug!("Ignoring connection reset on UDP socket");
                    continue;
                }
                Err(e) => return Err(TransportError::Receive(e)),
            }
        }
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket.local_addr().map_err(TransportError::LocalAddr)
    }
}

/// In-process datagram network used for tests and local simulation.
///
/// Each endpoint owns an inbox; sending to an address without an endpoint
/// fails with [`TransportError::Unreachable`], and an address can be marked
/// as dropping so datagrams to it vanish silently.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<Mutex<MemoryNetworkState>>,
}

#[derive(Default)]
struct MemoryNetworkState {
    inboxes: HashMap<SocketAddr, VecDeque<Datagram>>,
    dropping: Vec<SocketAddr>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryNetworkState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Creates (or reopens) the endpoint bound to `addr`.
    pub fn endpoint(&self, addr: SocketAddr) -> MemoryTransport {
        self.state().inboxes.entry(addr).or_default();
        MemoryTransport {
            addr,
            network: self.clone(),
        }
    }

    /// Removes an endpoint; later sends to it fail as unreachable.
    pub fn close(&self, addr: SocketAddr) {
        self.state().inboxes.remove(&addr);
    }

    /// Datagrams addressed to `addr` are accepted but discarded.
    pub fn set_dropping(&self, addr: SocketAddr, dropping: bool) {
        let mut state = self.state();
        state.dropping.retain(|a| *a != addr);
        if dropping {
            state.dropping.push(addr);
        }
    }

    /// Queues a raw datagram as if `from` had sent it to `to`.
    pub fn inject(&self, from: SocketAddr, to: SocketAddr, bytes: Vec<u8>) {
        if let Some(inbox) = self.state().inboxes.get_mut(&to) {
            inbox.push_back((from, bytes));
        }
    }

    /// Takes every datagram waiting in the inbox of `addr`.
    pub fn drain(&self, addr: SocketAddr) -> Vec<Datagram> {
        self.state()
            .inboxes
            .get_mut(&addr)
            .map(|inbox| inbox.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn pending(&self, addr: SocketAddr) -> usize {
        self.state().inboxes.get(&addr).map_or(0, VecDeque::len)
    }
}

pub struct MemoryTransport {
    addr: SocketAddr,
    network: MemoryNetwork,
}

impl Transport for MemoryTransport {
    fn send(&mut self, peer: SocketAddr, bytes: &[u8]) -> Result<(), TransportError> {
        let mut state = self.network.state();
        if state.dropping.contains(&peer) {
            return Ok(());
        }
        match state.inboxes.get_mut(&peer) {
            Some(inbox) => {
                inbox.push_back((self.addr, bytes.to_vec()));
                Ok(())
            }
            None => {
                warn!("Memory transport: no endpoint at {}", peer);
                Err(TransportError::Unreachable(peer))
            }
        }
    }

    fn receive(&mut self) -> Result<Option<Datagram>, TransportError> {
        Ok(self
            .network
            .state()
            .inboxes
            .get_mut(&self.addr)
            .and_then(VecDeque::pop_front))
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.addr)
    }
}
