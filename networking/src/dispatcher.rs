use tokio::sync::mpsc;
use tracing::warn;

use crate::messages::{DataRequest, DataResponse, InventoryRequest, InventoryResponse};
use crate::types::PeerId;

/// Message queued for the transport, addressed to one or more peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    InventoryRequest {
        peer_ids: Vec<PeerId>,
        request: InventoryRequest,
    },
    InventoryResponse {
        peer_ids: Vec<PeerId>,
        response: InventoryResponse,
    },
    DataRequest {
        peer_ids: Vec<PeerId>,
        request: DataRequest,
    },
    DataResponse {
        peer_ids: Vec<PeerId>,
        response: DataResponse,
    },
}

impl OutboundMessage {
    pub fn peer_ids(&self) -> &[PeerId] {
        match self {
            OutboundMessage::InventoryRequest { peer_ids, .. }
            | OutboundMessage::InventoryResponse { peer_ids, .. }
            | OutboundMessage::DataRequest { peer_ids, .. }
            | OutboundMessage::DataResponse { peer_ids, .. } => peer_ids,
        }
    }
}

/// Outbound half of the transport.
///
/// Sends are fire-and-forget: the protocol has no negative acknowledgement,
/// so implementations log delivery failures instead of returning them.
pub trait Dispatcher: Send + Sync + 'static {
    fn get_inventory(&self, peer_ids: Vec<PeerId>, request: InventoryRequest);

    fn send_inventory(&self, peer_ids: Vec<PeerId>, response: InventoryResponse);

    fn get_data(&self, peer_ids: Vec<PeerId>, request: DataRequest);

    fn send_data(&self, peer_ids: Vec<PeerId>, response: DataResponse);
}

fn forward(sender: &mpsc::UnboundedSender<OutboundMessage>, message: OutboundMessage) {
    if let Err(err) = sender.send(message) {
        warn!(peers = ?err.0.peer_ids(), "Transport is gone, dropping outbound message");
    }
}

impl Dispatcher for mpsc::UnboundedSender<OutboundMessage> {
    fn get_inventory(&self, peer_ids: Vec<PeerId>, request: InventoryRequest) {
        forward(self, OutboundMessage::InventoryRequest { peer_ids, request });
    }

    fn send_inventory(&self, peer_ids: Vec<PeerId>, response: InventoryResponse) {
        forward(self, OutboundMessage::InventoryResponse { peer_ids, response });
    }

    fn get_data(&self, peer_ids: Vec<PeerId>, request: DataRequest) {
        forward(self, OutboundMessage::DataRequest { peer_ids, request });
    }

    fn send_data(&self, peer_ids: Vec<PeerId>, response: DataResponse) {
        forward(self, OutboundMessage::DataResponse { peer_ids, response });
    }
}
