//! Sync configuration.
//!
//! Operational parameters for synchronization: queue sizes, batch sizes,
//! timeouts and limits. Every field falls back to the constant below when
//! omitted from a config file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Capacity of the inbound message queue. A full queue blocks delivery.
pub const DEFAULT_MESSAGE_QUEUE_SIZE: usize = 512;

/// Maximum hashes returned in a single inventory response.
pub const MAX_INVENTORY_SIZE: usize = 100;

/// Interval between scans of the pending hash table.
pub const REQUEST_TICK_INTERVAL_MS: u64 = 500;

/// How long a data request may stay unanswered before it is re-armed.
pub const REQUEST_RETRY_TIMEOUT_MS: u64 = 5_000;

/// Attempts before a hash forgets its candidate peers and goes dormant.
pub const MAX_REQUEST_ATTEMPTS: u32 = 8;

/// Maximum hashes batched into one data request to the same peer.
pub const MAX_ENTRIES_PER_REQUEST: usize = 16;

/// Maximum number of tracked pending hashes.
pub const MAX_PENDING_HASHES: usize = 10_000;

/// How long an entry without candidate peers is kept before it is dropped.
pub const DORMANT_TTL_MS: u64 = 600_000;

/// Number of satisfied hashes remembered for duplicate suppression.
pub const RESOLVED_CACHE_SIZE: usize = 4_096;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    pub message_queue_size: usize,
    /// Attach the local node id to every sync log line.
    pub print_self_id: bool,
    pub max_inventory_size: usize,
    pub request: RequestConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            message_queue_size: DEFAULT_MESSAGE_QUEUE_SIZE,
            print_self_id: false,
            max_inventory_size: MAX_INVENTORY_SIZE,
            request: RequestConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RequestConfig {
    pub tick_interval_ms: u64,
    pub retry_timeout_ms: u64,
    pub max_attempts: u32,
    pub max_entries_per_request: usize,
    pub max_pending: usize,
    pub resolved_cache_size: usize,
    pub dormant_ttl_ms: u64,
}

impl RequestConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn retry_timeout(&self) -> Duration {
        Duration::from_millis(self.retry_timeout_ms)
    }

    pub fn dormant_ttl(&self) -> Duration {
        Duration::from_millis(self.dormant_ttl_ms)
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: REQUEST_TICK_INTERVAL_MS,
            retry_timeout_ms: REQUEST_RETRY_TIMEOUT_MS,
            max_attempts: MAX_REQUEST_ATTEMPTS,
            max_entries_per_request: MAX_ENTRIES_PER_REQUEST,
            max_pending: MAX_PENDING_HASHES,
            resolved_cache_size: RESOLVED_CACHE_SIZE,
            dormant_ttl_ms: DORMANT_TTL_MS,
        }
    }
}
