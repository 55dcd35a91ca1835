use std::fmt::{self, Display};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use containers::{Block, Vote};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Stable string identity of a remote peer.
pub type PeerId = String;

/// Logical protocol channels the sync layer takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ChannelId {
    Header = 1,
    Block = 2,
    Proposal = 3,
    CommitCertificate = 4,
    Vote = 5,
}

impl ChannelId {
    pub const ALL: [ChannelId; 5] = [
        ChannelId::Header,
        ChannelId::Block,
        ChannelId::Proposal,
        ChannelId::CommitCertificate,
        ChannelId::Vote,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelId::Header => "header",
            ChannelId::Block => "block",
            ChannelId::Proposal => "proposal",
            ChannelId::CommitCertificate => "commit_certificate",
            ChannelId::Vote => "vote",
        }
    }
}

impl Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content handed to the consensus engine / mempool once it is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusMessage {
    Block(Block),
    Vote(Vote),
}

impl Display for ConsensusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsensusMessage::Block(block) => {
                write!(f, "Block(height={}, hash={})", block.height().0, block.hash())
            }
            ConsensusMessage::Vote(vote) => {
                write!(f, "Vote(height={}, validator={})", vote.height.0, vote.validator_id)
            }
        }
    }
}

/// Downstream consumer of resolved blocks and votes.
#[async_trait]
pub trait MessageSink<M>: Send + Sync + Clone + 'static {
    async fn send(&self, message: M) -> Result<()>;
}

#[async_trait]
impl<M: Send + 'static> MessageSink<M> for mpsc::UnboundedSender<M> {
    async fn send(&self, message: M) -> Result<()> {
        mpsc::UnboundedSender::send(self, message)
            .map_err(|err| anyhow!("failed to send message to consumer: {err}"))
    }
}

#[async_trait]
impl<M: Send + 'static> MessageSink<M> for mpsc::Sender<M> {
    async fn send(&self, message: M) -> Result<()> {
        mpsc::Sender::send(self, message)
            .await
            .map_err(|err| anyhow!("failed to send message to consumer: {err}"))
    }
}
