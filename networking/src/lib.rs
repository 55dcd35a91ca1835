pub mod codec;
pub mod dispatcher;
pub mod messages;
pub mod peer;
pub mod sync;
pub mod types;

pub use dispatcher::{Dispatcher, OutboundMessage};
pub use messages::{
    DataRequest, DataResponse, InventoryRequest, InventoryResponse, MessageContent, SyncMessage,
};
pub use types::{ChannelId, ConsensusMessage, MessageSink, PeerId};
