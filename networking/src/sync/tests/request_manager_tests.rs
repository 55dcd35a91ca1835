use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::Metrics;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;

use super::{create_block, hash_of};
use crate::dispatcher::OutboundMessage;
use crate::messages::DataRequest;
use crate::sync::config::RequestConfig;
use crate::sync::request_manager::{AddOutcome, PendingTable, RequestManager, RequestState};
use crate::types::ChannelId;

const TIMEOUT: Duration = Duration::from_secs(5);

fn create_config(max_attempts: u32, max_entries_per_request: usize) -> RequestConfig {
    RequestConfig {
        retry_timeout_ms: TIMEOUT.as_millis() as u64,
        max_attempts,
        max_entries_per_request,
        ..RequestConfig::default()
    }
}

fn peers(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

fn create_manager(
    config: &RequestConfig,
) -> (
    Arc<RequestManager<mpsc::UnboundedSender<OutboundMessage>>>,
    mpsc::UnboundedReceiver<containers::Block>,
    mpsc::UnboundedReceiver<OutboundMessage>,
    Arc<Metrics>,
) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let metrics = Arc::new(Metrics::new());
    let (manager, completions) = RequestManager::new(config, Arc::new(outbound_tx), metrics.clone());
    (manager, completions, outbound_rx, metrics)
}

#[test]
fn test_block_is_emitted_once() {
    let (manager, mut completions, _outbound, _metrics) = create_manager(&RequestConfig::default());
    let block = create_block(7, hash_of(1), "main");
    let hash = block.hash();

    assert_eq!(manager.add_hash(hash, peers(&["a"])), AddOutcome::Added);
    assert!(manager.is_pending(&hash));

    assert!(manager.add_block(block.clone()));
    assert!(!manager.add_block(block.clone()));

    assert_eq!(completions.try_recv().unwrap(), block);
    assert!(completions.try_recv().is_err());
    assert!(!manager.is_pending(&hash));
    assert!(manager.is_resolved(&hash));

    // Late advertisement of a satisfied hash
    assert_eq!(manager.add_hash(hash, peers(&["b"])), AddOutcome::AlreadyResolved);
    assert_eq!(manager.num_pending(), 0);
}

#[test]
fn test_unrequested_block_is_still_emitted() {
    let (manager, mut completions, _outbound, _metrics) = create_manager(&RequestConfig::default());
    let block = create_block(3, hash_of(2), "main");

    assert!(manager.add_block(block.clone()));
    assert_eq!(completions.try_recv().unwrap(), block);
}

#[test]
fn test_hints_merge_peers() {
    let mut table = PendingTable::new(&create_config(8, 16));
    let hash = hash_of(9);

    assert_eq!(table.add_hash(hash, peers(&["a"])), AddOutcome::Added);
    assert_eq!(table.add_hash(hash, peers(&["b", "a"])), AddOutcome::Merged);
    assert_eq!(table.add_hash(hash, Vec::new()), AddOutcome::Merged);

    let entry = table.get(&hash).unwrap();
    assert_eq!(entry.peers(), &peers(&["a", "b"])[..]);
    assert_eq!(entry.state(), RequestState::NotRequested);
    assert_eq!(table.len(), 1);
}

#[test]
fn test_single_request_in_flight() {
    let mut table = PendingTable::new(&create_config(8, 16));
    let hash = hash_of(1);
    table.add_hash(hash, peers(&["a", "b"]));

    let now = Instant::now();
    let outcome = table.poll(now);
    assert_eq!(outcome.requests, vec![("a".to_string(), vec![hash])]);
    assert_eq!(table.get(&hash).unwrap().state(), RequestState::InFlight);

    // New hints do not trigger a second request while one is outstanding
    table.add_hash(hash, peers(&["c"]));
    let outcome = table.poll(now + Duration::from_secs(1));
    assert!(outcome.requests.is_empty());
    assert_eq!(outcome.retried, 0);
}

#[test]
fn test_retry_rotates_candidates() {
    let mut table = PendingTable::new(&create_config(8, 16));
    let hash = hash_of(1);
    table.add_hash(hash, peers(&["a", "b"]));

    let start = Instant::now();
    let targets: Vec<String> = (0..4)
        .map(|round| {
            let outcome = table.poll(start + TIMEOUT * round);
            assert_eq!(outcome.retried, usize::from(round > 0));
            outcome.requests[0].0.clone()
        })
        .collect();

    assert_eq!(targets, peers(&["a", "b", "a", "b"]));
    assert_eq!(table.get(&hash).unwrap().attempts(), 4);
}

#[test]
fn test_exhausted_entry_goes_dormant() {
    let mut table = PendingTable::new(&create_config(2, 16));
    let hash = hash_of(4);
    table.add_hash(hash, peers(&["a"]));

    let start = Instant::now();
    assert_eq!(table.poll(start).requests.len(), 1);
    assert_eq!(table.poll(start + TIMEOUT).requests.len(), 1);

    let outcome = table.poll(start + TIMEOUT * 2);
    assert_eq!(outcome.retried, 1);
    assert!(outcome.requests.is_empty());

    let entry = table.get(&hash).unwrap();
    assert!(entry.peers().is_empty());
    assert_eq!(entry.state(), RequestState::NotRequested);
    assert!(table.is_pending(&hash));

    // A fresh hint revives it
    table.add_hash(hash, peers(&["c"]));
    let outcome = table.poll(start + TIMEOUT * 3);
    assert_eq!(outcome.requests, vec![("c".to_string(), vec![hash])]);
}

#[test]
fn test_hash_without_peers_is_never_requested() {
    let mut table = PendingTable::new(&create_config(8, 16));
    table.add_hash(hash_of(5), Vec::new());

    let now = Instant::now();
    assert!(table.poll(now).requests.is_empty());
    assert!(table.poll(now + TIMEOUT * 10).requests.is_empty());
    assert!(table.is_pending(&hash_of(5)));
}

#[test]
fn test_requests_are_batched_per_peer() {
    let mut table = PendingTable::new(&create_config(8, 2));
    let hashes: Vec<_> = (1..=5).map(hash_of).collect();
    for hash in &hashes {
        table.add_hash(*hash, peers(&["a"]));
    }
    table.add_hash(hash_of(9), peers(&["b"]));

    let now = Instant::now();
    let outcome = table.poll(now);
    assert_eq!(
        outcome.requests,
        vec![
            ("a".to_string(), hashes[0..2].to_vec()),
            ("b".to_string(), vec![hash_of(9)]),
        ]
    );

    let outcome = table.poll(now);
    assert_eq!(outcome.requests, vec![("a".to_string(), hashes[2..4].to_vec())]);

    let outcome = table.poll(now);
    assert_eq!(outcome.requests, vec![("a".to_string(), hashes[4..5].to_vec())]);
}

#[test]
fn test_full_table_rejects_new_hashes() {
    let config = RequestConfig {
        max_pending: 1,
        ..RequestConfig::default()
    };
    let (manager, _completions, _outbound, metrics) = create_manager(&config);

    assert_eq!(manager.add_hash(hash_of(1), peers(&["a"])), AddOutcome::Added);
    assert_eq!(manager.add_hash(hash_of(2), peers(&["a"])), AddOutcome::Rejected);
    assert_eq!(manager.add_hash(hash_of(1), peers(&["b"])), AddOutcome::Merged);
    assert_eq!(metrics.messages_dropped("pending_full"), 1);
}

#[test]
fn test_resolved_cache_is_bounded() {
    let config = RequestConfig {
        resolved_cache_size: 2,
        ..RequestConfig::default()
    };
    let mut table = PendingTable::new(&config);

    for byte in 1..=3 {
        assert!(table.resolve(hash_of(byte)));
    }
    assert!(!table.is_resolved(&hash_of(1)));
    assert!(table.is_resolved(&hash_of(3)));
    assert_eq!(table.add_hash(hash_of(1), peers(&["a"])), AddOutcome::Added);
}

#[test]
fn test_tick_sends_data_requests() {
    let (manager, _completions, mut outbound, metrics) = create_manager(&RequestConfig::default());
    let hash = hash_of(6);
    manager.add_hash(hash, peers(&["a"]));

    manager.tick();

    assert_eq!(
        outbound.try_recv().unwrap(),
        OutboundMessage::DataRequest {
            peer_ids: peers(&["a"]),
            request: DataRequest {
                channel_id: ChannelId::Block,
                entries: vec![hash.to_string()],
            },
        }
    );
    assert_eq!(metrics.data_requests_sent(), 1);

    // Still in flight, nothing new to send
    manager.tick();
    assert!(outbound.try_recv().is_err());
    assert_eq!(manager.entry(&hash).unwrap().state(), RequestState::InFlight);
}

#[test]
fn test_full_table_evicts_oldest_dormant_entry() {
    let config = RequestConfig {
        max_pending: 2,
        ..RequestConfig::default()
    };
    let mut table = PendingTable::new(&config);
    table.add_hash(hash_of(1), Vec::new());
    table.add_hash(hash_of(2), Vec::new());

    let later = Instant::now() + Duration::from_secs(24 * 60 * 60);
    table.poll(later);

    assert_eq!(table.add_hash(hash_of(3), peers(&["a"])), AddOutcome::Added);
    assert!(!table.is_pending(&hash_of(1)));
    assert!(table.is_pending(&hash_of(2)));

    let outcome = table.poll(later);
    assert_eq!(outcome.requests, vec![("a".to_string(), vec![hash_of(3)])]);
}

#[test]
fn test_in_flight_entries_are_never_evicted() {
    let config = RequestConfig {
        max_pending: 1,
        ..RequestConfig::default()
    };
    let mut table = PendingTable::new(&config);
    table.add_hash(hash_of(1), peers(&["a"]));
    table.poll(Instant::now());

    assert_eq!(table.add_hash(hash_of(2), Vec::new()), AddOutcome::Rejected);
    assert!(table.is_pending(&hash_of(1)));
}

#[test]
fn test_dormant_entries_expire() {
    let config = RequestConfig {
        dormant_ttl_ms: 60_000,
        ..create_config(1, 16)
    };
    let ttl = config.dormant_ttl();
    let mut table = PendingTable::new(&config);
    table.add_hash(hash_of(1), Vec::new());
    table.add_hash(hash_of(2), peers(&["a"]));

    let start = Instant::now();
    let outcome = table.poll(start);
    assert_eq!(outcome.expired, 0);

    // hash 2 times out once and loses its only candidate
    let outcome = table.poll(start + TIMEOUT);
    assert!(outcome.requests.is_empty());
    assert_eq!(outcome.expired, 0);

    let outcome = table.poll(start + ttl);
    assert_eq!(outcome.expired, 1);
    assert!(!table.is_pending(&hash_of(1)));
    assert!(table.is_pending(&hash_of(2)));

    let outcome = table.poll(start + TIMEOUT + ttl);
    assert_eq!(outcome.expired, 1);
    assert!(table.is_empty());
}

#[test]
fn test_new_hint_keeps_dormant_entry_alive() {
    let config = RequestConfig {
        dormant_ttl_ms: 60_000,
        ..RequestConfig::default()
    };
    let ttl = config.dormant_ttl();
    let mut table = PendingTable::new(&config);
    table.add_hash(hash_of(1), Vec::new());

    let start = Instant::now();
    table.poll(start);
    table.add_hash(hash_of(1), peers(&["a"]));

    let outcome = table.poll(start + ttl);
    assert_eq!(outcome.expired, 0);
    assert_eq!(outcome.requests, vec![("a".to_string(), vec![hash_of(1)])]);
}
