use std::sync::Arc;
use std::time::Duration;

use chain::{BlockStore, ChainReader};
use containers::{Block, BlockHeader, Bytes32, Height};
use metrics::Metrics;
use networking::sync::{MessageHandler, RequestConfig, SyncConfig, SyncManager};
use networking::{
    ConsensusMessage, InventoryResponse, MessageContent, OutboundMessage, SyncMessage, ChannelId,
};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

type Node = SyncManager<
    RwLock<BlockStore>,
    mpsc::UnboundedSender<OutboundMessage>,
    mpsc::UnboundedSender<ConsensusMessage>,
>;

struct TestNode {
    manager: Arc<Node>,
    store: Arc<RwLock<BlockStore>>,
    outbound: mpsc::UnboundedReceiver<OutboundMessage>,
    consumer: mpsc::UnboundedReceiver<ConsensusMessage>,
}

fn create_chain(len: u64) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::new();
    for height in 0..len {
        let header = BlockHeader {
            chain_id: "e2e".to_string(),
            epoch: 1,
            height: Height(height),
            parent: blocks.last().map(Block::hash).unwrap_or_else(Bytes32::zero),
            state_hash: Bytes32::zero(),
            timestamp: height,
            proposer: "p".to_string(),
        };
        blocks.push(Block::new(header, Vec::new()));
    }
    blocks
}

fn create_node(id: &str, blocks: &[Block]) -> TestNode {
    let mut store = BlockStore::new();
    for block in blocks {
        store.add_block(block.clone());
    }
    let store = Arc::new(RwLock::new(store));

    let config = SyncConfig {
        request: RequestConfig {
            tick_interval_ms: 10,
            retry_timeout_ms: 100,
            ..RequestConfig::default()
        },
        ..SyncConfig::default()
    };

    let (outbound_tx, outbound) = mpsc::unbounded_channel();
    let (consumer_tx, consumer) = mpsc::unbounded_channel();
    let manager = SyncManager::new(
        store.clone(),
        id,
        Arc::new(outbound_tx),
        consumer_tx,
        config,
        Arc::new(Metrics::new()),
    );

    TestNode {
        manager: Arc::new(manager),
        store,
        outbound,
        consumer,
    }
}

fn into_content(message: OutboundMessage) -> MessageContent {
    match message {
        OutboundMessage::InventoryRequest { request, .. } => request.into(),
        OutboundMessage::InventoryResponse { response, .. } => response.into(),
        OutboundMessage::DataRequest { request, .. } => request.into(),
        OutboundMessage::DataResponse { response, .. } => response.into(),
    }
}

/// Carry everything addressed to `to_id` over the wire encoding into `to`.
/// Messages for any other peer are dropped.
fn link<H: MessageHandler + 'static>(
    mut outbound: mpsc::UnboundedReceiver<OutboundMessage>,
    from_id: &'static str,
    to_id: &'static str,
    to: Arc<H>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            if !message.peer_ids().iter().any(|peer| peer == to_id) {
                continue;
            }
            let content = into_content(message);
            let raw = to.encode_message(&content).unwrap();
            let parsed = to.parse_message(from_id, content.channel_id(), &raw).unwrap();
            if to.handle_message(parsed).await.is_err() {
                break;
            }
        }
    })
}

async fn next_block(consumer: &mut mpsc::UnboundedReceiver<ConsensusMessage>) -> Block {
    match timeout(Duration::from_secs(5), consumer.recv()).await {
        Ok(Some(ConsensusMessage::Block(block))) => block,
        other => panic!("expected a block, got {other:?}"),
    }
}

#[tokio::test]
async fn test_catch_up_from_single_peer() {
    let blocks = create_chain(4);
    let mut local = create_node("local", &blocks[..1]);
    let mut remote = create_node("remote", &blocks);

    let cancel = CancellationToken::new();
    local.manager.start(&cancel);
    remote.manager.start(&cancel);

    let to_remote = link(local.outbound, "local", "remote", remote.manager.clone());
    let to_local = link(remote.outbound, "remote", "local", local.manager.clone());

    local
        .manager
        .request_inventory(vec!["remote".to_string()], blocks[0].hash(), None);

    for expected in &blocks[1..] {
        let block = next_block(&mut local.consumer).await;
        assert_eq!(&block, expected);
        local.store.write().add_block(block);
    }

    for block in &blocks {
        assert!(local.store.contains(&block.hash()));
    }
    assert_eq!(local.manager.request_manager().num_pending(), 0);
    assert!(remote.consumer.try_recv().is_err());

    cancel.cancel();
    local.manager.wait().await;
    remote.manager.wait().await;
    to_remote.abort();
    to_local.abort();
}

#[tokio::test]
async fn test_silent_peer_is_retried_elsewhere() {
    let blocks = create_chain(2);
    let local = create_node("local", &blocks[..1]);
    let remote = create_node("remote", &blocks);
    let target = blocks[1].hash();

    let cancel = CancellationToken::new();
    local.manager.start(&cancel);
    remote.manager.start(&cancel);

    // Nothing reaches "silent"; its requests just time out
    let to_remote = link(local.outbound, "local", "remote", remote.manager.clone());
    let to_local = link(remote.outbound, "remote", "local", local.manager.clone());

    for peer in ["silent", "remote"] {
        let advert = InventoryResponse {
            channel_id: ChannelId::Block,
            entries: vec![target.to_string()],
        };
        local
            .manager
            .handle_message(SyncMessage::new(peer, advert))
            .await
            .unwrap();
    }

    let mut consumer = local.consumer;
    let block = next_block(&mut consumer).await;
    assert_eq!(block.hash(), target);
    assert!(local.manager.request_manager().is_resolved(&target));

    cancel.cancel();
    local.manager.wait().await;
    remote.manager.wait().await;
    to_remote.abort();
    to_local.abort();
}
