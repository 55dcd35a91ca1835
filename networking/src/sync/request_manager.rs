//! Pending request tracking.
//!
//! Turns "a peer told us hash H exists" into "block H was fetched and handed
//! on exactly once".
//!
//! ## Entry lifecycle
//!
//! ```text
//!  add_hash ──► NotRequested ──poll──► InFlight ──add_block──► resolved
//!                    ▲                    │
//!                    └──── retry timeout ─┘
//! ```
//!
//! - A hash has at most one request in flight.
//! - Hints for a known hash merge their candidate peers into the entry.
//! - Candidates are tried round-robin; each timeout moves to the next one.
//! - After `max_attempts` timeouts the candidates are dropped and the entry
//!   stays dormant until a new hint names a peer.
//! - Entries without candidates (e.g. learned from a vote) are never
//!   requested, but any block delivered for them still resolves them.
//!   They are dropped once dormant for `dormant_ttl_ms`, and a full table
//!   evicts the oldest of them to admit a new hash.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use containers::{Block, Bytes32};
use metrics::Metrics;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, trace, warn};

use super::config::RequestConfig;
use crate::dispatcher::Dispatcher;
use crate::messages::DataRequest;
use crate::types::{ChannelId, PeerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    NotRequested,
    InFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    Merged,
    AlreadyResolved,
    /// The table is full and the hint was dropped.
    Rejected,
}

#[derive(Debug, Clone)]
pub struct PendingEntry {
    hash: Bytes32,
    /// Candidate sources, first hint first
    peers: Vec<PeerId>,
    state: RequestState,
    attempts: u32,
    last_attempt: Option<Instant>,
    /// Round-robin cursor into `peers`
    next_peer: usize,
    seq: u64,
    /// First scan that found the entry without candidates
    dormant_since: Option<Instant>,
}

impl PendingEntry {
    fn new(hash: Bytes32, seq: u64) -> Self {
        Self {
            hash,
            peers: Vec::new(),
            state: RequestState::NotRequested,
            attempts: 0,
            last_attempt: None,
            next_peer: 0,
            seq,
            dormant_since: None,
        }
    }

    fn is_dormant(&self) -> bool {
        self.peers.is_empty() && self.state == RequestState::NotRequested
    }

    fn merge_peers(&mut self, peer_ids: Vec<PeerId>) {
        for peer_id in peer_ids {
            if !self.peers.contains(&peer_id) {
                self.peers.push(peer_id);
            }
        }
        if !self.peers.is_empty() {
            self.dormant_since = None;
        }
    }

    pub fn hash(&self) -> Bytes32 {
        self.hash
    }

    pub fn peers(&self) -> &[PeerId] {
        &self.peers
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_attempt(&self) -> Option<Instant> {
        self.last_attempt
    }
}

/// Bounded memory of satisfied hashes, oldest forgotten first.
#[derive(Debug, Default)]
struct ResolvedCache {
    capacity: usize,
    seen: HashSet<Bytes32>,
    order: VecDeque<Bytes32>,
}

impl ResolvedCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ..Default::default()
        }
    }

    fn contains(&self, hash: &Bytes32) -> bool {
        self.seen.contains(hash)
    }

    /// Returns `true` if newly inserted.
    fn insert(&mut self, hash: Bytes32) -> bool {
        if !self.seen.insert(hash) {
            return false;
        }
        self.order.push_back(hash);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }
}

/// Result of one scan over the table.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Hashes to request, batched per peer in scheduling order.
    pub requests: Vec<(PeerId, Vec<Bytes32>)>,
    /// In-flight entries whose timeout expired during this scan.
    pub retried: usize,
    /// Dormant entries dropped after outliving the dormant TTL.
    pub expired: usize,
}

/// Pending hash bookkeeping without any I/O.
#[derive(Debug)]
pub struct PendingTable {
    retry_timeout: Duration,
    max_attempts: u32,
    max_entries_per_request: usize,
    max_pending: usize,
    dormant_ttl: Duration,
    entries: HashMap<Bytes32, PendingEntry>,
    resolved: ResolvedCache,
    next_seq: u64,
}

impl PendingTable {
    pub fn new(config: &RequestConfig) -> Self {
        Self {
            retry_timeout: config.retry_timeout(),
            max_attempts: config.max_attempts.max(1),
            max_entries_per_request: config.max_entries_per_request.max(1),
            max_pending: config.max_pending,
            dormant_ttl: config.dormant_ttl(),
            entries: HashMap::new(),
            resolved: ResolvedCache::new(config.resolved_cache_size),
            next_seq: 0,
        }
    }

    pub fn add_hash(&mut self, hash: Bytes32, peer_ids: Vec<PeerId>) -> AddOutcome {
        if self.resolved.contains(&hash) {
            return AddOutcome::AlreadyResolved;
        }

        if let Some(entry) = self.entries.get_mut(&hash) {
            entry.merge_peers(peer_ids);
            return AddOutcome::Merged;
        }

        if self.entries.len() >= self.max_pending && !self.evict_oldest_dormant() {
            return AddOutcome::Rejected;
        }

        let mut entry = PendingEntry::new(hash, self.next_seq);
        self.next_seq += 1;
        entry.merge_peers(peer_ids);
        self.entries.insert(hash, entry);
        AddOutcome::Added
    }

    /// Drop the oldest entry nobody can currently serve.
    fn evict_oldest_dormant(&mut self) -> bool {
        let oldest = self
            .entries
            .values()
            .filter(|entry| entry.is_dormant())
            .min_by_key(|entry| entry.seq)
            .map(|entry| entry.hash);

        match oldest {
            Some(hash) => {
                self.entries.remove(&hash);
                debug!(hash = %hash, "Evicted dormant hash to make room");
                true
            }
            None => false,
        }
    }

    /// Mark a hash as satisfied. Returns `false` if it already was.
    pub fn resolve(&mut self, hash: Bytes32) -> bool {
        self.entries.remove(&hash);
        self.resolved.insert(hash)
    }

    /// Expire timed out requests and schedule new ones.
    pub fn poll(&mut self, now: Instant) -> PollOutcome {
        let mut outcome = PollOutcome::default();
        let mut batch_index: HashMap<PeerId, usize> = HashMap::new();

        let mut expired = Vec::new();

        let mut entries: Vec<&mut PendingEntry> = self.entries.values_mut().collect();
        entries.sort_by_key(|entry| entry.seq);

        for entry in entries {
            if entry.state == RequestState::InFlight {
                let expired = entry
                    .last_attempt
                    .is_none_or(|at| now.saturating_duration_since(at) >= self.retry_timeout);
                if !expired {
                    continue;
                }

                entry.state = RequestState::NotRequested;
                outcome.retried += 1;

                if entry.attempts >= self.max_attempts {
                    debug!(
                        hash = %entry.hash,
                        attempts = entry.attempts,
                        "Giving up on candidate peers, hash is dormant"
                    );
                    entry.peers.clear();
                    entry.attempts = 0;
                    entry.next_peer = 0;
                }
            }

            if entry.peers.is_empty() {
                let since = *entry.dormant_since.get_or_insert(now);
                if now.saturating_duration_since(since) >= self.dormant_ttl {
                    expired.push(entry.hash);
                }
                continue;
            }

            let peer_id = entry.peers[entry.next_peer % entry.peers.len()].clone();
            let index = *batch_index.entry(peer_id.clone()).or_insert_with(|| {
                outcome.requests.push((peer_id.clone(), Vec::new()));
                outcome.requests.len() - 1
            });
            let batch = &mut outcome.requests[index].1;
            if batch.len() >= self.max_entries_per_request {
                // Picked up on a later scan
                continue;
            }

            batch.push(entry.hash);
            entry.state = RequestState::InFlight;
            entry.attempts += 1;
            entry.last_attempt = Some(now);
            entry.next_peer = entry.next_peer.wrapping_add(1);
        }

        for hash in &expired {
            self.entries.remove(hash);
            debug!(hash = %hash, "Dropped dormant hash");
        }
        outcome.expired = expired.len();

        outcome
    }

    pub fn get(&self, hash: &Bytes32) -> Option<&PendingEntry> {
        self.entries.get(hash)
    }

    pub fn is_pending(&self, hash: &Bytes32) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn is_resolved(&self, hash: &Bytes32) -> bool {
        self.resolved.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Drives a [`PendingTable`]: sends data requests on a timer and publishes
/// resolved blocks on the completion stream.
pub struct RequestManager<D: Dispatcher> {
    table: Mutex<PendingTable>,
    dispatcher: Arc<D>,
    metrics: Arc<Metrics>,
    completed: mpsc::UnboundedSender<Block>,
    tick_interval: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<D: Dispatcher> RequestManager<D> {
    /// Create a manager and the receiving end of its completion stream.
    pub fn new(
        config: &RequestConfig,
        dispatcher: Arc<D>,
        metrics: Arc<Metrics>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Block>) {
        let (completed, completions) = mpsc::unbounded_channel();
        let manager = Self {
            table: Mutex::new(PendingTable::new(config)),
            dispatcher,
            metrics,
            completed,
            tick_interval: config.tick_interval(),
            handle: Mutex::new(None),
        };
        (Arc::new(manager), completions)
    }

    /// Register a hash known to exist, with peers believed to hold it.
    pub fn add_hash(&self, hash: Bytes32, peer_ids: Vec<PeerId>) -> AddOutcome {
        let (outcome, pending) = {
            let mut table = self.table.lock();
            (table.add_hash(hash, peer_ids), table.len())
        };
        self.metrics.set_pending_hashes(pending as i64);

        match outcome {
            AddOutcome::Added => trace!(hash = %hash, "Tracking pending hash"),
            AddOutcome::Rejected => {
                warn!(hash = %hash, pending, "Pending hash table full, dropping hint");
                self.metrics.inc_messages_dropped("pending_full");
            }
            AddOutcome::Merged | AddOutcome::AlreadyResolved => {}
        }
        outcome
    }

    /// Resolve the block's hash and publish the block once.
    ///
    /// Returns `false` when the block had already been resolved.
    pub fn add_block(&self, block: Block) -> bool {
        let hash = block.hash();
        let (resolved, pending) = {
            let mut table = self.table.lock();
            (table.resolve(hash), table.len())
        };
        self.metrics.set_pending_hashes(pending as i64);

        if !resolved {
            trace!(hash = %hash, "Block already resolved");
            return false;
        }

        if self.completed.send(block).is_err() {
            warn!(hash = %hash, "Completion stream closed, dropping resolved block");
        }
        true
    }

    pub fn is_pending(&self, hash: &Bytes32) -> bool {
        self.table.lock().is_pending(hash)
    }

    pub fn is_resolved(&self, hash: &Bytes32) -> bool {
        self.table.lock().is_resolved(hash)
    }

    pub fn num_pending(&self) -> usize {
        self.table.lock().len()
    }

    pub fn entry(&self, hash: &Bytes32) -> Option<PendingEntry> {
        self.table.lock().get(hash).cloned()
    }

    /// One scan: expire, schedule, then dispatch outside the lock.
    pub fn tick(&self) {
        let (outcome, pending) = {
            let mut table = self.table.lock();
            (table.poll(Instant::now()), table.len())
        };
        self.metrics.set_pending_hashes(pending as i64);

        if outcome.retried > 0 {
            debug!(retried = outcome.retried, "Re-armed timed out data requests");
            self.metrics.inc_data_request_retries(outcome.retried as u64);
        }
        if outcome.expired > 0 {
            debug!(expired = outcome.expired, "Expired dormant hashes");
        }

        for (peer_id, hashes) in outcome.requests {
            if hashes.is_empty() {
                continue;
            }
            debug!(peer = %peer_id, num_hashes = hashes.len(), "Requesting blocks from peer");

            let request = DataRequest {
                channel_id: ChannelId::Block,
                entries: hashes.iter().map(ToString::to_string).collect(),
            };
            self.dispatcher.get_data(vec![peer_id], request);
            self.metrics.inc_data_requests_sent();
        }
    }

    /// Spawn the scan loop; it exits when `cancel` fires.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) {
        let manager = Arc::clone(self);
        let handle = tokio::spawn(
            async move { manager.run(cancel).await }.instrument(debug_span!("request_manager")),
        );

        if let Some(previous) = self.handle.lock().replace(handle) {
            warn!("Request manager started twice, aborting previous loop");
            previous.abort();
        }
    }

    /// Wait for the scan loop to exit after cancellation.
    pub async fn wait(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    warn!(%err, "Request manager loop failed");
                }
            }
        }
    }

    async fn run(&self, cancel: CancellationToken) {
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.tick(),
            }
        }

        debug!("Request manager stopped");
    }
}
