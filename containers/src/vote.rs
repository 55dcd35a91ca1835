use crate::{Bytes32, Height};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Vote {
    /// Block this vote is for, if any. Epoch votes carry no block.
    pub block: Option<Bytes32>,
    pub height: Height,
    pub epoch: u64,
    pub validator_id: String,
    pub signature: Vec<u8>,
}

/// Aggregated votes proving that a block has been committed.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommitCertificate {
    pub block_hash: Bytes32,
    pub votes: Vec<Vote>,
}

impl CommitCertificate {
    pub fn new(block_hash: Bytes32, votes: Vec<Vote>) -> Self {
        Self { block_hash, votes }
    }

    pub fn votes(&self) -> &[Vote] {
        &self.votes
    }
}
