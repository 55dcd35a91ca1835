pub mod types;
pub mod block;
pub mod vote;
pub mod proposal;

pub use block::{Block, BlockHeader};
pub use ethereum_types::H256;
pub use proposal::Proposal;
pub use types::{Bytes32, Height};
pub use vote::{CommitCertificate, Vote};
