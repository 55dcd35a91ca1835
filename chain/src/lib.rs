//! Read access to the local block tree.
//!
//! The sync layer only ever needs to look blocks up by hash and to follow
//! child links forward; block import and validation live elsewhere.

pub mod store;

use containers::{Block, Bytes32};
use parking_lot::RwLock;

pub use store::BlockStore;

/// A block together with the hashes of its known children.
///
/// `children` keeps insertion order, so the first entry is always the first
/// child ever recorded for this block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedBlock {
    pub block: Block,
    pub children: Vec<Bytes32>,
}

impl ExtendedBlock {
    pub fn hash(&self) -> Bytes32 {
        self.block.hash()
    }
}

pub trait ChainReader: Send + Sync + 'static {
    fn find_block(&self, hash: &Bytes32) -> Option<ExtendedBlock>;

    fn contains(&self, hash: &Bytes32) -> bool {
        self.find_block(hash).is_some()
    }
}

impl ChainReader for RwLock<BlockStore> {
    fn find_block(&self, hash: &Bytes32) -> Option<ExtendedBlock> {
        self.read().find_block(hash)
    }

    fn contains(&self, hash: &Bytes32) -> bool {
        self.read().contains(hash)
    }
}
