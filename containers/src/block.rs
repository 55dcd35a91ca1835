use crate::{Bytes32, Height};
use ethereum_types::H256;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub chain_id: String,
    pub epoch: u64,
    pub height: Height,
    pub parent: Bytes32,
    pub state_hash: Bytes32,
    pub timestamp: u64,
    pub proposer: String,
}

impl BlockHeader {
    /// Content hash of the header.
    ///
    /// Every field is fed to the hasher in declaration order; strings are
    /// length-prefixed so adjacent fields cannot alias each other.
    pub fn hash(&self) -> Bytes32 {
        let mut hasher = Sha256::new();
        hasher.update((self.chain_id.len() as u64).to_be_bytes());
        hasher.update(self.chain_id.as_bytes());
        hasher.update(self.epoch.to_be_bytes());
        hasher.update(self.height.0.to_be_bytes());
        hasher.update(self.parent.as_bytes());
        hasher.update(self.state_hash.as_bytes());
        hasher.update(self.timestamp.to_be_bytes());
        hasher.update((self.proposer.len() as u64).to_be_bytes());
        hasher.update(self.proposer.as_bytes());

        Bytes32(H256::from_slice(&hasher.finalize()))
    }
}

/// A block as exchanged between peers: header plus opaque transactions.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub txs: Vec<Vec<u8>>,
}

impl Block {
    pub fn new(header: BlockHeader, txs: Vec<Vec<u8>>) -> Self {
        Self { header, txs }
    }

    pub fn hash(&self) -> Bytes32 {
        self.header.hash()
    }

    pub fn parent(&self) -> Bytes32 {
        self.header.parent
    }

    pub fn height(&self) -> Height {
        self.header.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(height: u64, parent: Bytes32) -> BlockHeader {
        BlockHeader {
            chain_id: "testnet".to_string(),
            height: Height(height),
            parent,
            ..Default::default()
        }
    }

    #[test]
    fn test_hash_is_deterministic() {
        let a = Block::new(header(1, Bytes32::zero()), vec![]);
        let b = Block::new(header(1, Bytes32::zero()), vec![b"tx".to_vec()]);
        // Transactions are not part of the header hash.
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_hash_depends_on_header_fields() {
        let a = header(1, Bytes32::zero());
        let b = header(2, Bytes32::zero());
        let c = header(1, Bytes32::from([1u8; 32]));
        assert_ne!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn test_string_fields_do_not_alias() {
        let mut a = header(1, Bytes32::zero());
        a.chain_id = "ab".to_string();
        a.proposer = "c".to_string();
        let mut b = a.clone();
        b.chain_id = "a".to_string();
        b.proposer = "bc".to_string();
        assert_ne!(a.hash(), b.hash());
    }
}
