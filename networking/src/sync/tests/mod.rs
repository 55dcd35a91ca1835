mod config_tests;
mod request_manager_tests;

use std::sync::Arc;

use chain::BlockStore;
use containers::{Block, BlockHeader, Bytes32, Height};
use parking_lot::RwLock;

/// Linear chain of `len` blocks starting at genesis (height 0).
pub(super) fn create_chain(len: u64) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::new();
    for height in 0..len {
        let parent = blocks.last().map(Block::hash).unwrap_or_else(Bytes32::zero);
        blocks.push(create_block(height, parent, "main"));
    }
    blocks
}

pub(super) fn create_block(height: u64, parent: Bytes32, proposer: &str) -> Block {
    Block::new(
        BlockHeader {
            chain_id: "testnet".to_string(),
            epoch: 1,
            height: Height(height),
            parent,
            state_hash: Bytes32::zero(),
            timestamp: 1_700_000_000 + height,
            proposer: proposer.to_string(),
        },
        vec![height.to_be_bytes().to_vec()],
    )
}

pub(super) fn create_store(blocks: &[Block]) -> Arc<RwLock<BlockStore>> {
    let mut store = BlockStore::new();
    for block in blocks {
        store.add_block(block.clone());
    }
    Arc::new(RwLock::new(store))
}

pub(super) fn hash_of(byte: u8) -> Bytes32 {
    Bytes32::from([byte; 32])
}
