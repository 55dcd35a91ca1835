use serde::{Deserialize, Serialize};

use crate::types::{ChannelId, PeerId};

/// Ask a peer for the hashes following `start` on its chain, up to `end`.
///
/// Hashes are hex strings at the protocol boundary. An empty `end` asks for
/// as many hashes as the responder is willing to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRequest {
    pub channel_id: ChannelId,
    pub start: String,
    pub end: String,
}

/// Ordered list of hashes a peer claims to have.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryResponse {
    pub channel_id: ChannelId,
    pub entries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRequest {
    pub channel_id: ChannelId,
    pub entries: Vec<String>,
}

/// A single encoded block, vote or proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataResponse {
    pub channel_id: ChannelId,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    InventoryRequest(InventoryRequest),
    InventoryResponse(InventoryResponse),
    DataRequest(DataRequest),
    DataResponse(DataResponse),
}

impl MessageContent {
    pub fn kind(&self) -> &'static str {
        match self {
            MessageContent::InventoryRequest(_) => "inventory_request",
            MessageContent::InventoryResponse(_) => "inventory_response",
            MessageContent::DataRequest(_) => "data_request",
            MessageContent::DataResponse(_) => "data_response",
        }
    }

    pub fn channel_id(&self) -> ChannelId {
        match self {
            MessageContent::InventoryRequest(req) => req.channel_id,
            MessageContent::InventoryResponse(resp) => resp.channel_id,
            MessageContent::DataRequest(req) => req.channel_id,
            MessageContent::DataResponse(resp) => resp.channel_id,
        }
    }
}

impl From<InventoryRequest> for MessageContent {
    fn from(request: InventoryRequest) -> Self {
        MessageContent::InventoryRequest(request)
    }
}

impl From<InventoryResponse> for MessageContent {
    fn from(response: InventoryResponse) -> Self {
        MessageContent::InventoryResponse(response)
    }
}

impl From<DataRequest> for MessageContent {
    fn from(request: DataRequest) -> Self {
        MessageContent::DataRequest(request)
    }
}

impl From<DataResponse> for MessageContent {
    fn from(response: DataResponse) -> Self {
        MessageContent::DataResponse(response)
    }
}

/// Inbound message as delivered by the transport, already parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncMessage {
    pub peer_id: PeerId,
    pub channel_id: ChannelId,
    pub content: MessageContent,
}

impl SyncMessage {
    pub fn new(peer_id: impl Into<PeerId>, content: impl Into<MessageContent>) -> Self {
        let content = content.into();
        Self {
            peer_id: peer_id.into(),
            channel_id: content.channel_id(),
            content,
        }
    }
}
