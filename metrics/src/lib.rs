pub mod server;

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Counters and gauges for the peer-synchronization layer.
///
/// Failures on the sync path are silent towards peers, so drop counters are
/// the only place operators can see them.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    messages_received: IntCounterVec,
    messages_dropped: IntCounterVec,
    // Pending requests
    data_requests_sent: IntCounter,
    data_request_retries: IntCounter,
    pending_hashes: IntGauge,
    // Delivery
    blocks_delivered: IntCounter,
    votes_forwarded: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let messages_received = IntCounterVec::new(
            Opts::new("sync_messages_received_total", "Total number of sync messages processed"),
            &["kind"],
        ).unwrap();
        registry.register(Box::new(messages_received.clone())).unwrap();

        let messages_dropped = IntCounterVec::new(
            Opts::new("sync_messages_dropped_total", "Total number of sync messages or entries dropped"),
            &["reason"],
        ).unwrap();
        registry.register(Box::new(messages_dropped.clone())).unwrap();

        // Pending requests
        let data_requests_sent = IntCounter::with_opts(Opts::new("sync_data_requests_sent_total", "Total number of data requests sent to peers")).unwrap();
        registry.register(Box::new(data_requests_sent.clone())).unwrap();

        let data_request_retries = IntCounter::with_opts(Opts::new("sync_data_request_retries_total", "Total number of timed out data requests re-armed")).unwrap();
        registry.register(Box::new(data_request_retries.clone())).unwrap();

        let pending_hashes = IntGauge::with_opts(Opts::new("sync_pending_hashes", "Number of hashes known but not yet fetched")).unwrap();
        registry.register(Box::new(pending_hashes.clone())).unwrap();

        // Delivery
        let blocks_delivered = IntCounter::with_opts(Opts::new("sync_blocks_delivered_total", "Total number of resolved blocks handed to the consumer")).unwrap();
        registry.register(Box::new(blocks_delivered.clone())).unwrap();

        let votes_forwarded = IntCounter::with_opts(Opts::new("sync_votes_forwarded_total", "Total number of votes handed to the consumer")).unwrap();
        registry.register(Box::new(votes_forwarded.clone())).unwrap();

        Self {
            registry,
            messages_received,
            messages_dropped,
            data_requests_sent,
            data_request_retries,
            pending_hashes,
            blocks_delivered,
            votes_forwarded,
        }
    }

    pub fn gather(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::<u8>::new();
        let encoder = TextEncoder::new();
        if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
            tracing::warn!(%err, "failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }

    pub fn inc_messages_received(&self, kind: &str) {
        self.messages_received.with_label_values(&[kind]).inc();
    }

    pub fn inc_messages_dropped(&self, reason: &str) {
        self.messages_dropped.with_label_values(&[reason]).inc();
    }

    pub fn messages_dropped(&self, reason: &str) -> u64 {
        self.messages_dropped.with_label_values(&[reason]).get()
    }

    // Pending requests
    pub fn inc_data_requests_sent(&self) {
        self.data_requests_sent.inc();
    }

    pub fn inc_data_request_retries(&self, n: u64) {
        self.data_request_retries.inc_by(n);
    }

    pub fn data_requests_sent(&self) -> u64 {
        self.data_requests_sent.get()
    }

    pub fn set_pending_hashes(&self, v: i64) {
        self.pending_hashes.set(v);
    }

    // Delivery
    pub fn inc_blocks_delivered(&self) {
        self.blocks_delivered.inc();
    }

    pub fn blocks_delivered(&self) -> u64 {
        self.blocks_delivered.get()
    }

    pub fn inc_votes_forwarded(&self) {
        self.votes_forwarded.inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
