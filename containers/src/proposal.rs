use crate::{Block, CommitCertificate};
use serde::{Deserialize, Serialize};

/// A proposed block, optionally carrying the commit certificate of its
/// parent so receivers can finalize the parent in the same step.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Proposal {
    pub block: Block,
    pub proposer_id: String,
    pub commit_certificate: Option<CommitCertificate>,
}
