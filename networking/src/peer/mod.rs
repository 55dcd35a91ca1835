//! Peer handles and the peer registry.
//!
//! A [`Peer`] is owned by the transport that created it and shared with the
//! [`PeerTable`] through an `Arc`. Stopping a peer cancels its connection
//! token; the transport task driving that connection watches the token and
//! tears the connection down.

pub mod peer_table;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

use crate::types::PeerId;

pub use peer_table::{PeerIdAddress, PeerTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Running,
    Stopped,
}

#[derive(Debug)]
pub struct Peer {
    id: PeerId,
    net_address: SocketAddr,
    direction: Direction,
    /// Trusted bootstrap peer, never evicted by age.
    is_seed: AtomicBool,
    connection: CancellationToken,
}

impl Peer {
    pub fn new(id: impl Into<PeerId>, net_address: SocketAddr, direction: Direction) -> Self {
        Self {
            id: id.into(),
            net_address,
            direction,
            is_seed: AtomicBool::new(false),
            connection: CancellationToken::new(),
        }
    }

    pub fn with_seed(self, is_seed: bool) -> Self {
        self.set_seed(is_seed);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn net_address(&self) -> SocketAddr {
        self.net_address
    }

    pub fn is_outbound(&self) -> bool {
        self.direction == Direction::Outbound
    }

    pub fn is_seed(&self) -> bool {
        self.is_seed.load(Ordering::Relaxed)
    }

    pub fn set_seed(&self, is_seed: bool) {
        self.is_seed.store(is_seed, Ordering::Relaxed);
    }

    pub fn state(&self) -> PeerState {
        if self.connection.is_cancelled() {
            PeerState::Stopped
        } else {
            PeerState::Running
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == PeerState::Running
    }

    /// Stop the underlying connection. Idempotent.
    pub fn stop(&self) {
        self.connection.cancel();
    }

    /// Resolves once [`Peer::stop`] has been called.
    pub async fn stopped(&self) {
        self.connection.cancelled().await
    }
}
