//! In-memory block tree.
//!
//! Indexes blocks by hash and records parent -> child links so the chain can
//! be walked forward. A block may arrive before its parent; the link is
//! recorded anyway and becomes walkable once the parent is stored.

use std::collections::HashMap;

use containers::{Block, Bytes32};
use tracing::debug;

use crate::ExtendedBlock;

#[derive(Debug, Default, Clone)]
pub struct BlockStore {
    /// All stored blocks, indexed by hash
    blocks: HashMap<Bytes32, Block>,

    /// Children of each block in the order they were first recorded
    children: HashMap<Bytes32, Vec<Bytes32>>,
}

impl BlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store rooted at the given genesis block.
    pub fn with_genesis(genesis: Block) -> Self {
        let mut store = Self::new();
        store.add_block(genesis);
        store
    }

    /// Add a block to the store.
    ///
    /// Adding the same block twice is a no-op. Returns the block hash.
    pub fn add_block(&mut self, block: Block) -> Bytes32 {
        let hash = block.hash();
        if self.blocks.contains_key(&hash) {
            return hash;
        }
        let parent = block.parent();

        debug!(hash = %hash, parent = %parent, height = block.height().0, "Storing block");

        self.blocks.insert(hash, block);

        let siblings = self.children.entry(parent).or_default();
        if !siblings.contains(&hash) {
            siblings.push(hash);
        }

        hash
    }

    pub fn get_block(&self, hash: &Bytes32) -> Option<&Block> {
        self.blocks.get(hash)
    }

    pub fn contains(&self, hash: &Bytes32) -> bool {
        self.blocks.contains_key(hash)
    }

    /// Children of a block, first recorded child first.
    pub fn children(&self, hash: &Bytes32) -> Vec<Bytes32> {
        self.children.get(hash).cloned().unwrap_or_default()
    }

    pub fn find_block(&self, hash: &Bytes32) -> Option<ExtendedBlock> {
        self.blocks.get(hash).map(|block| ExtendedBlock {
            block: block.clone(),
            children: self.children(hash),
        })
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use containers::{BlockHeader, Height};
    use pretty_assertions::assert_eq;

    fn create_test_block(height: u64, parent: Bytes32) -> Block {
        Block::new(
            BlockHeader {
                chain_id: "testnet".to_string(),
                height: Height(height),
                parent,
                ..Default::default()
            },
            vec![],
        )
    }

    #[test]
    fn test_genesis_is_stored() {
        let genesis = create_test_block(0, Bytes32::zero());
        let mut store = BlockStore::with_genesis(genesis.clone());

        assert_eq!(store.len(), 1);
        assert!(store.contains(&genesis.hash()));
        assert!(store.children(&genesis.hash()).is_empty());

        // Re-adding is a no-op
        store.add_block(genesis);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_children_keep_insertion_order() {
        let genesis = create_test_block(0, Bytes32::zero());
        let mut store = BlockStore::with_genesis(genesis.clone());

        let first = create_test_block(1, genesis.hash());
        let mut second = create_test_block(1, genesis.hash());
        second.header.proposer = "other".to_string();

        let first_hash = store.add_block(first);
        let second_hash = store.add_block(second);
        store.add_block(create_test_block(1, genesis.hash()));

        assert_eq!(store.children(&genesis.hash()), vec![first_hash, second_hash]);
        let extended = store.find_block(&genesis.hash()).unwrap();
        assert_eq!(extended.children.first(), Some(&first_hash));
    }

    #[test]
    fn test_child_before_parent_is_linked() {
        let genesis = create_test_block(0, Bytes32::zero());
        let mut store = BlockStore::with_genesis(genesis.clone());

        let parent = create_test_block(1, genesis.hash());
        let child = create_test_block(2, parent.hash());

        let child_hash = store.add_block(child);
        assert!(store.find_block(&parent.hash()).is_none());

        let parent_hash = store.add_block(parent);
        let extended = store.find_block(&parent_hash).unwrap();
        assert_eq!(extended.children, vec![child_hash]);
        assert_eq!(store.children(&genesis.hash()), vec![parent_hash]);
    }

    #[test]
    fn test_find_missing_block() {
        let store = BlockStore::new();
        assert!(store.is_empty());
        assert!(store.find_block(&Bytes32::from([7u8; 32])).is_none());
    }
}
