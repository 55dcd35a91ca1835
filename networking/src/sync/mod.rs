//! Block synchronization protocol.
//!
//! - **Request manager**: tracks advertised hashes until a block for each
//!   one arrives, retrying across candidate peers.
//! - **Sync manager**: answers inventory and data requests from the local
//!   chain and forwards resolved blocks and votes to the consumer.

pub mod config;
pub mod error;
pub mod request_manager;
pub mod sync_manager;

pub use config::{RequestConfig, SyncConfig};
pub use error::SyncError;
pub use request_manager::{AddOutcome, PendingEntry, PendingTable, RequestManager, RequestState};
pub use sync_manager::{MessageHandler, SyncManager};

#[cfg(test)]
mod tests;
