use containers::Bytes32;
use thiserror::Error;

use crate::codec::CodecError;
use crate::types::ChannelId;

/// Why an inbound message (or one entry of it) was dropped.
///
/// None of these are reported back to the peer; they are logged and counted.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid {field} hash {value:?}: {source}")]
    InvalidHash {
        field: &'static str,
        value: String,
        source: hex::FromHexError,
    },
    #[error("inventory request without start hash")]
    MissingStartHash,
    #[error("block {0} not found")]
    BlockNotFound(Bytes32),
    #[error("unsupported channel {channel} for {kind}")]
    UnsupportedChannel {
        kind: &'static str,
        channel: ChannelId,
    },
    #[error("unexpected message with tag {tag}")]
    UnexpectedMessage { tag: u8 },
    #[error(transparent)]
    Codec(CodecError),
    #[error("sync manager is not accepting messages")]
    QueueClosed,
}

impl SyncError {
    pub(crate) fn invalid_hash(field: &'static str, value: &str, source: hex::FromHexError) -> Self {
        SyncError::InvalidHash {
            field,
            value: value.to_owned(),
            source,
        }
    }

    /// Stable label used in logs and drop counters.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::InvalidHash { .. } | SyncError::MissingStartHash | SyncError::Codec(_) => {
                "malformed"
            }
            SyncError::BlockNotFound(_) => "not_found",
            SyncError::UnsupportedChannel { .. } => "unsupported_channel",
            SyncError::UnexpectedMessage { .. } => "unexpected_message",
            SyncError::QueueClosed => "closed",
        }
    }
}

impl From<CodecError> for SyncError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::UnknownTag(tag) => SyncError::UnexpectedMessage { tag },
            err => SyncError::Codec(err),
        }
    }
}
