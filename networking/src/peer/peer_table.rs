use std::cmp;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, warn};

use super::Peer;
use crate::types::PeerId;

/// Percentage of known peers returned by [`PeerTable::get_selection`].
pub const GET_SELECTION_PERCENT: usize = 23;

/// Minimum peers returned by a selection, so small tables still bootstrap
/// newcomers with everything they know.
pub const MIN_GET_SELECTION: usize = 32;

/// Maximum peers returned by a selection.
pub const MAX_GET_SELECTION: usize = 250;

/// Identity and address pair shared during peer exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdAddress {
    pub id: PeerId,
    pub addr: SocketAddr,
}

/// Lookup table for connected peers.
///
/// The canonical record of each peer lives in `peers`; `addrs` and `order`
/// only hold keys into it. All three are updated under the same lock, so a
/// peer is either present in every view or in none.
#[derive(Debug, Default)]
pub struct PeerTable {
    inner: Mutex<PeerTableInner>,
}

#[derive(Debug, Default)]
struct PeerTableInner {
    peers: HashMap<PeerId, Arc<Peer>>,
    addrs: HashMap<SocketAddr, PeerId>,
    /// Insertion order, oldest first
    order: Vec<PeerId>,
}

impl PeerTableInner {
    fn remove(&mut self, peer_id: &str) -> Option<Arc<Peer>> {
        let peer = self.peers.remove(peer_id)?;
        if self.addrs.get(&peer.net_address()).is_some_and(|id| id == peer_id) {
            self.addrs.remove(&peer.net_address());
        }
        self.order.retain(|id| id != peer_id);
        Some(peer)
    }
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peer, replacing any peer registered under the same identity.
    ///
    /// The replaced peer is stopped and keeps its slot in the insertion
    /// order. When an outbound peer is superseded (typically by an inbound
    /// reconnect) its seed flag carries over to the new peer.
    pub fn add_peer(&self, peer: Arc<Peer>) -> bool {
        let mut inner = self.inner.lock();
        let peer_id = peer.id().to_owned();

        if let Some(old) = inner.peers.get(&peer_id).cloned() {
            old.stop();
            warn!(peer = %peer_id, "Stopping duplicated peer");

            if old.is_outbound() {
                peer.set_seed(old.is_seed());
            }
            if old.net_address() != peer.net_address()
                && inner.addrs.get(&old.net_address()) == Some(&peer_id)
            {
                inner.addrs.remove(&old.net_address());
            }
        } else {
            inner.order.push(peer_id.clone());
        }

        // A different identity at the same address is a stale record
        if let Some(previous) = inner.addrs.get(&peer.net_address()).cloned() {
            if previous != peer_id {
                if let Some(stale) = inner.remove(&previous) {
                    stale.stop();
                    warn!(
                        peer = %previous,
                        addr = %stale.net_address(),
                        replaced_by = %peer_id,
                        "Dropping peer superseded at the same address"
                    );
                }
            }
        }

        inner.addrs.insert(peer.net_address(), peer_id.clone());
        inner.peers.insert(peer_id, peer);

        true
    }

    /// Remove a peer from every index. No-op if the peer is unknown.
    pub fn delete_peer(&self, peer_id: &str) {
        let mut inner = self.inner.lock();
        if inner.remove(peer_id).is_some() {
            debug!(peer = %peer_id, "Peer removed from table");
        }
    }

    /// Evict the least recently added peer that is not a seed.
    ///
    /// The evicted peer is returned but not stopped; the caller decides what
    /// to do with its connection.
    pub fn purge_oldest_peer(&self) -> Option<Arc<Peer>> {
        let mut inner = self.inner.lock();

        let oldest = inner
            .order
            .iter()
            .find(|id| inner.peers.get(*id).is_some_and(|peer| !peer.is_seed()))
            .cloned()?;

        let peer = inner.remove(&oldest);
        if peer.is_some() {
            debug!(peer = %oldest, "Purged oldest peer");
        }
        peer
    }

    pub fn get_peer(&self, peer_id: &str) -> Option<Arc<Peer>> {
        self.inner.lock().peers.get(peer_id).cloned()
    }

    pub fn get_peer_with_addr(&self, addr: &SocketAddr) -> Option<Arc<Peer>> {
        let inner = self.inner.lock();
        inner.addrs.get(addr).and_then(|id| inner.peers.get(id)).cloned()
    }

    pub fn peer_exists(&self, peer_id: &str) -> bool {
        self.inner.lock().peers.contains_key(peer_id)
    }

    pub fn peer_addr_exists(&self, addr: &SocketAddr) -> bool {
        self.inner.lock().addrs.contains_key(addr)
    }

    /// Snapshot of all peers in insertion order.
    pub fn get_all_peers(&self) -> Vec<Arc<Peer>> {
        let inner = self.inner.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.peers.get(id).cloned())
            .collect()
    }

    /// Randomly select peers to share during peer exchange.
    ///
    /// Returns `max(23% of peers, min(32, peers))`, capped at 250. Only the
    /// first `n` slots of a copy of the peer list are shuffled (partial
    /// Fisher-Yates) before slicing.
    pub fn get_selection(&self) -> Vec<PeerIdAddress> {
        let mut peers = self.get_all_peers();
        if peers.is_empty() {
            return Vec::new();
        }

        let num_peers = selection_size(peers.len());

        let mut rng = rand::thread_rng();
        for i in 0..num_peers {
            // pick between the current index and the end
            let j = rng.gen_range(i..peers.len());
            peers.swap(i, j);
        }

        peers
            .into_iter()
            .take(num_peers)
            .map(|peer| PeerIdAddress {
                id: peer.id().to_owned(),
                addr: peer.net_address(),
            })
            .collect()
    }

    pub fn get_total_num_peers(&self) -> usize {
        self.inner.lock().order.len()
    }

    #[cfg(test)]
    pub(super) fn index_sizes(&self) -> (usize, usize, usize) {
        let inner = self.inner.lock();
        (inner.peers.len(), inner.addrs.len(), inner.order.len())
    }
}

/// Number of peers returned by a selection over `total` known peers.
pub fn selection_size(total: usize) -> usize {
    cmp::max(
        cmp::min(MIN_GET_SELECTION, total),
        total * GET_SELECTION_PERCENT / 100,
    )
    .min(MAX_GET_SELECTION)
}
