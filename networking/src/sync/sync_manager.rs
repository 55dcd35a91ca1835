//! Sync manager: the layer between the transport and the consensus engine.
//!
//! Serves inventory and block data to peers from the local chain, feeds
//! advertised hashes into the request manager, and hands resolved blocks
//! and votes to the consumer. All inbound messages are drained one at a
//! time by a single loop, so the handlers below never race each other.

use async_trait::async_trait;
use chain::ChainReader;
use containers::{Block, Bytes32, CommitCertificate, Proposal, Vote};
use metrics::Metrics;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, info_span, warn};

use super::{
    config::SyncConfig,
    error::SyncError,
    request_manager::RequestManager,
};
use crate::{
    codec::SyncCodec,
    dispatcher::Dispatcher,
    messages::{
        DataRequest, DataResponse, InventoryRequest, InventoryResponse, MessageContent, SyncMessage,
    },
    types::{ChannelId, ConsensusMessage, MessageSink, PeerId},
};

/// Contract between the transport and a protocol handler.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Channels this handler wants delivered.
    fn channel_ids(&self) -> Vec<ChannelId>;

    /// Decode raw bytes received from `peer_id` on `channel_id`.
    fn parse_message(
        &self,
        peer_id: &str,
        channel_id: ChannelId,
        raw: &[u8],
    ) -> Result<SyncMessage, SyncError>;

    fn encode_message(&self, content: &MessageContent) -> Result<Vec<u8>, SyncError>;

    /// Queue a parsed message. Waits while the inbound queue is full.
    async fn handle_message(&self, message: SyncMessage) -> Result<(), SyncError>;
}

type Receivers = (mpsc::Receiver<SyncMessage>, mpsc::UnboundedReceiver<Block>);

pub struct SyncManager<C, D, S>
where
    C: ChainReader,
    D: Dispatcher,
    S: MessageSink<ConsensusMessage>,
{
    handler: Arc<SyncHandler<C, D, S>>,
    span: Span,
    incoming: mpsc::Sender<SyncMessage>,
    receivers: Mutex<Option<Receivers>>,
    cancel: Mutex<Option<CancellationToken>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<C, D, S> SyncManager<C, D, S>
where
    C: ChainReader,
    D: Dispatcher,
    S: MessageSink<ConsensusMessage>,
{
    pub fn new(
        chain: Arc<C>,
        self_id: &str,
        dispatcher: Arc<D>,
        consumer: S,
        config: SyncConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (request_manager, completions) =
            RequestManager::new(&config.request, dispatcher.clone(), metrics.clone());
        let (incoming, inbox) = mpsc::channel(config.message_queue_size.max(1));

        let span = if config.print_self_id {
            info_span!("sync", id = %self_id)
        } else {
            info_span!("sync")
        };

        let handler = SyncHandler {
            chain,
            dispatcher,
            consumer,
            request_manager,
            metrics,
            max_inventory_size: config.max_inventory_size.max(1),
        };

        Self {
            handler: Arc::new(handler),
            span,
            incoming,
            receivers: Mutex::new(Some((inbox, completions))),
            cancel: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    /// Launch the processing loop and the request manager.
    ///
    /// Both run under a child of `parent`, so cancelling either `parent` or
    /// calling [`SyncManager::stop`] shuts them down.
    pub fn start(&self, parent: &CancellationToken) {
        let Some((inbox, completions)) = self.receivers.lock().take() else {
            warn!(parent: &self.span, "Sync manager already started");
            return;
        };

        let cancel = parent.child_token();
        self.handler.request_manager.start(cancel.clone());

        let handler = Arc::clone(&self.handler);
        let handle = tokio::spawn(
            handler
                .main_loop(cancel.clone(), inbox, completions)
                .instrument(self.span.clone()),
        );

        *self.cancel.lock() = Some(cancel);
        *self.handle.lock() = Some(handle);
        info!(parent: &self.span, "Sync manager started");
    }

    pub fn stop(&self) {
        if let Some(cancel) = self.cancel.lock().as_ref() {
            cancel.cancel();
        }
    }

    /// Wait until the processing loop and the request manager have exited.
    pub async fn wait(&self) {
        self.handler.request_manager.wait().await;

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    warn!(parent: &self.span, %err, "Sync loop failed");
                }
            }
        }
    }

    /// Ask peers for the block hashes following `start`.
    pub fn request_inventory(&self, peer_ids: Vec<PeerId>, start: Bytes32, end: Option<Bytes32>) {
        let request = InventoryRequest {
            channel_id: ChannelId::Block,
            start: start.to_string(),
            end: end.map(|hash| hash.to_string()).unwrap_or_default(),
        };
        debug!(parent: &self.span, peers = ?peer_ids, start = %request.start, "Requesting inventory");
        self.handler.dispatcher.get_inventory(peer_ids, request);
    }

    pub fn request_manager(&self) -> &Arc<RequestManager<D>> {
        &self.handler.request_manager
    }

    /// Process one message immediately, bypassing the queue.
    pub(crate) async fn process_message(&self, message: SyncMessage) -> Result<(), SyncError> {
        self.handler.process_message(message).await
    }
}

#[async_trait]
impl<C, D, S> MessageHandler for SyncManager<C, D, S>
where
    C: ChainReader,
    D: Dispatcher,
    S: MessageSink<ConsensusMessage>,
{
    fn channel_ids(&self) -> Vec<ChannelId> {
        ChannelId::ALL.to_vec()
    }

    fn parse_message(
        &self,
        peer_id: &str,
        channel_id: ChannelId,
        raw: &[u8],
    ) -> Result<SyncMessage, SyncError> {
        let content = SyncCodec::decode_message(raw)?;
        Ok(SyncMessage {
            peer_id: peer_id.to_owned(),
            channel_id,
            content,
        })
    }

    fn encode_message(&self, content: &MessageContent) -> Result<Vec<u8>, SyncError> {
        Ok(SyncCodec::encode_message(content)?)
    }

    async fn handle_message(&self, message: SyncMessage) -> Result<(), SyncError> {
        self.incoming
            .send(message)
            .await
            .map_err(|_| SyncError::QueueClosed)
    }
}

struct SyncHandler<C, D: Dispatcher, S> {
    chain: Arc<C>,
    dispatcher: Arc<D>,
    consumer: S,
    request_manager: Arc<RequestManager<D>>,
    metrics: Arc<Metrics>,
    max_inventory_size: usize,
}

impl<C, D, S> SyncHandler<C, D, S>
where
    C: ChainReader,
    D: Dispatcher,
    S: MessageSink<ConsensusMessage>,
{
    async fn main_loop(
        self: Arc<Self>,
        cancel: CancellationToken,
        mut inbox: mpsc::Receiver<SyncMessage>,
        mut completions: mpsc::UnboundedReceiver<Block>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(message) = inbox.recv() => {
                    let kind = message.content.kind();
                    self.metrics.inc_messages_received(kind);
                    if let Err(err) = self.process_message(message).await {
                        self.report_dropped(kind, &err);
                    }
                }
                Some(block) = completions.recv() => {
                    self.metrics.inc_blocks_delivered();
                    self.forward(ConsensusMessage::Block(block)).await;
                }
            }
        }

        info!("Sync manager stopped");
    }

    fn report_dropped(&self, what: &str, err: &SyncError) {
        match err {
            SyncError::BlockNotFound(_) => {
                debug!(what, reason = err.kind(), error = %err, "Dropping sync message")
            }
            _ => warn!(what, reason = err.kind(), error = %err, "Dropping sync message"),
        }
        self.metrics.inc_messages_dropped(err.kind());
    }

    async fn process_message(&self, message: SyncMessage) -> Result<(), SyncError> {
        let peer_id = message.peer_id;
        match message.content {
            MessageContent::InventoryRequest(req) => self.handle_inv_request(&peer_id, req),
            MessageContent::InventoryResponse(resp) => self.handle_inv_response(&peer_id, resp),
            MessageContent::DataRequest(req) => self.handle_data_request(&peer_id, req),
            MessageContent::DataResponse(resp) => self.handle_data_response(&peer_id, resp).await,
        }
    }

    fn handle_inv_request(&self, peer_id: &str, req: InventoryRequest) -> Result<(), SyncError> {
        debug!(
            peer = %peer_id,
            channel = %req.channel_id,
            start = %req.start,
            end = %req.end,
            "Received inventory request"
        );

        if req.channel_id != ChannelId::Block {
            return Err(SyncError::UnsupportedChannel {
                kind: "inventory_request",
                channel: req.channel_id,
            });
        }
        if req.start.is_empty() {
            return Err(SyncError::MissingStartHash);
        }

        let start: Bytes32 = req
            .start
            .parse()
            .map_err(|err| SyncError::invalid_hash("start", &req.start, err))?;
        let end: Option<Bytes32> = if req.end.is_empty() {
            None
        } else {
            Some(
                req.end
                    .parse()
                    .map_err(|err| SyncError::invalid_hash("end", &req.end, err))?,
            )
        };

        let entries = self.collect_inventory(start, end)?;
        let resp = InventoryResponse {
            channel_id: ChannelId::Block,
            entries,
        };

        debug!(
            peer = %peer_id,
            channel = %resp.channel_id,
            num_entries = resp.entries.len(),
            "Sending inventory response"
        );
        self.dispatcher.send_inventory(vec![peer_id.to_owned()], resp);
        Ok(())
    }

    /// Walk forward from `start` along first children.
    ///
    /// Stops at `end`, at a block without children, at a child that cannot
    /// be loaded, or after `max_inventory_size` hashes.
    fn collect_inventory(&self, start: Bytes32, end: Option<Bytes32>) -> Result<Vec<String>, SyncError> {
        let mut current = self
            .chain
            .find_block(&start)
            .ok_or(SyncError::BlockNotFound(start))?;
        let mut entries = vec![start.to_string()];

        if end == Some(start) {
            return Ok(entries);
        }

        while entries.len() < self.max_inventory_size {
            // TODO: restrict the walk to the finalized branch once the chain exposes it
            let Some(&next) = current.children.first() else {
                break;
            };

            if end == Some(next) {
                entries.push(next.to_string());
                break;
            }

            match self.chain.find_block(&next) {
                Some(block) => {
                    entries.push(next.to_string());
                    current = block;
                }
                None => {
                    warn!(hash = %next, "Failed to load child block, truncating inventory");
                    break;
                }
            }
        }

        Ok(entries)
    }

    fn handle_inv_response(&self, peer_id: &str, resp: InventoryResponse) -> Result<(), SyncError> {
        debug!(
            peer = %peer_id,
            channel = %resp.channel_id,
            num_entries = resp.entries.len(),
            "Received inventory response"
        );

        if resp.channel_id != ChannelId::Block {
            return Err(SyncError::UnsupportedChannel {
                kind: "inventory_response",
                channel: resp.channel_id,
            });
        }

        for entry in &resp.entries {
            let hash: Bytes32 = match entry.parse() {
                Ok(hash) => hash,
                Err(err) => {
                    self.report_dropped("inventory_entry", &SyncError::invalid_hash("inventory", entry, err));
                    continue;
                }
            };

            if self.chain.contains(&hash) {
                continue;
            }
            self.request_manager.add_hash(hash, vec![peer_id.to_owned()]);
        }

        Ok(())
    }

    fn handle_data_request(&self, peer_id: &str, req: DataRequest) -> Result<(), SyncError> {
        if req.channel_id != ChannelId::Block {
            return Err(SyncError::UnsupportedChannel {
                kind: "data_request",
                channel: req.channel_id,
            });
        }

        // One bad entry must not starve the rest of the request
        for entry in &req.entries {
            if let Err(err) = self.serve_block(peer_id, entry) {
                self.report_dropped("data_request_entry", &err);
            }
        }

        Ok(())
    }

    fn serve_block(&self, peer_id: &str, entry: &str) -> Result<(), SyncError> {
        let hash: Bytes32 = entry
            .parse()
            .map_err(|err| SyncError::invalid_hash("requested", entry, err))?;
        let block = self
            .chain
            .find_block(&hash)
            .ok_or(SyncError::BlockNotFound(hash))?;
        let payload = SyncCodec::encode_payload(&block.block)?;

        debug!(peer = %peer_id, hash = %hash, "Sending requested block");
        self.dispatcher.send_data(
            vec![peer_id.to_owned()],
            DataResponse {
                channel_id: ChannelId::Block,
                payload,
            },
        );
        Ok(())
    }

    async fn handle_data_response(&self, peer_id: &str, resp: DataResponse) -> Result<(), SyncError> {
        match resp.channel_id {
            ChannelId::Block => {
                let block: Block = SyncCodec::decode_payload(&resp.payload)?;
                self.handle_block(Some(peer_id), block);
            }
            ChannelId::Vote => {
                let vote: Vote = SyncCodec::decode_payload(&resp.payload)?;
                self.handle_vote(vote).await;
            }
            ChannelId::Proposal => {
                let proposal: Proposal = SyncCodec::decode_payload(&resp.payload)?;
                self.handle_proposal(peer_id, proposal).await;
            }
            channel => {
                return Err(SyncError::UnsupportedChannel {
                    kind: "data_response",
                    channel,
                });
            }
        }
        Ok(())
    }

    async fn handle_proposal(&self, peer_id: &str, proposal: Proposal) {
        debug!(
            peer = %peer_id,
            proposer = %proposal.proposer_id,
            has_cc = proposal.commit_certificate.is_some(),
            "Received proposal"
        );

        if let Some(cc) = &proposal.commit_certificate {
            self.handle_cc(cc).await;
        }
        self.handle_block(Some(peer_id), proposal.block);
    }

    /// Resolve the block in the request manager.
    ///
    /// When the sender is known and the parent is missing locally, the sender
    /// becomes the first candidate for the parent.
    fn handle_block(&self, origin: Option<&str>, block: Block) {
        let hash = block.hash();
        let parent = block.parent();
        debug!(hash = %hash, parent = %parent, height = block.height().0, "Received block");

        self.request_manager.add_block(block);

        if let Some(peer_id) = origin {
            if !parent.is_zero() && !self.chain.contains(&parent) {
                self.request_manager.add_hash(parent, vec![peer_id.to_owned()]);
            }
        }
    }

    async fn handle_cc(&self, cc: &CommitCertificate) {
        debug!(block = %cc.block_hash, num_votes = cc.votes().len(), "Received commit certificate");
        for vote in cc.votes() {
            self.forward_vote(vote.clone()).await;
        }
    }

    async fn handle_vote(&self, vote: Vote) {
        if let Some(hash) = vote.block {
            if !self.chain.contains(&hash) {
                // Source unknown, any later data response may satisfy it
                self.request_manager.add_hash(hash, Vec::new());
            }
        }
        self.forward_vote(vote).await;
    }

    async fn forward_vote(&self, vote: Vote) {
        self.metrics.inc_votes_forwarded();
        self.forward(ConsensusMessage::Vote(vote)).await;
    }

    async fn forward(&self, message: ConsensusMessage) {
        if let Err(err) = self.consumer.send(message).await {
            warn!(%err, "Failed to hand message to consumer");
        }
    }
}
