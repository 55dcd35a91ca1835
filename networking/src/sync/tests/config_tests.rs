use pretty_assertions::assert_eq;
use std::time::Duration;

use crate::sync::config::{
    DEFAULT_MESSAGE_QUEUE_SIZE, MAX_ENTRIES_PER_REQUEST, MAX_INVENTORY_SIZE, RequestConfig,
    SyncConfig,
};

#[test]
fn test_defaults() {
    let config = SyncConfig::default();
    assert_eq!(config.message_queue_size, DEFAULT_MESSAGE_QUEUE_SIZE);
    assert_eq!(config.max_inventory_size, MAX_INVENTORY_SIZE);
    assert_eq!(config.request.max_entries_per_request, MAX_ENTRIES_PER_REQUEST);
    assert!(!config.print_self_id);
}

#[test]
fn test_partial_yaml_falls_back_to_defaults() {
    let yaml = "print_self_id: true\nrequest:\n  retry_timeout_ms: 250\n";
    let config: SyncConfig = serde_yaml::from_str(yaml).unwrap();

    assert!(config.print_self_id);
    assert_eq!(config.message_queue_size, DEFAULT_MESSAGE_QUEUE_SIZE);
    assert_eq!(config.request.retry_timeout(), Duration::from_millis(250));
    assert_eq!(config.request.max_attempts, RequestConfig::default().max_attempts);
}

#[test]
fn test_unknown_field_rejected() {
    let result = serde_yaml::from_str::<SyncConfig>("message_queue: 10\n");
    assert!(result.is_err());
}

#[test]
fn test_zero_tick_interval_is_clamped() {
    let config = RequestConfig {
        tick_interval_ms: 0,
        ..RequestConfig::default()
    };
    assert_eq!(config.tick_interval(), Duration::from_millis(1));
}
