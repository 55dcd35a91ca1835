//! Wire codec for sync messages.
//!
//! A frame is one tag byte naming the message shape followed by the
//! snappy-framed bincode encoding of the message body. Block, vote and
//! proposal payloads inside a `DataResponse` are plain bincode.

use std::io::{self, Read, Write};

use bincode::Options;
use serde::{Serialize, de::DeserializeOwned};
use snap::read::FrameDecoder;
use snap::write::FrameEncoder;
use thiserror::Error;

use crate::messages::{DataRequest, DataResponse, InventoryRequest, InventoryResponse, MessageContent};

/// Upper bound for a decompressed frame and for any decoded value.
pub const MAX_MESSAGE_SIZE: u64 = 16 * 1024 * 1024;

pub const INVENTORY_REQUEST_TAG: u8 = 1;
pub const INVENTORY_RESPONSE_TAG: u8 = 2;
pub const DATA_REQUEST_TAG: u8 = 3;
pub const DATA_RESPONSE_TAG: u8 = 4;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("empty message")]
    Empty,
    #[error("unknown message tag {0}")]
    UnknownTag(u8),
    #[error("message exceeds {MAX_MESSAGE_SIZE} bytes")]
    TooLarge,
    #[error("snappy framing failed: {0}")]
    Compression(#[from] io::Error),
    #[error("bincode failed: {0}")]
    Serialization(#[from] bincode::Error),
}

fn bincode_options() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_MESSAGE_SIZE)
}

pub struct SyncCodec;

impl SyncCodec {
    fn compress(data: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = FrameEncoder::new(Vec::new());
        encoder.write_all(data)?;
        encoder
            .into_inner()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("Snappy framing failed: {e}")))
    }

    fn decompress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut decoder = FrameDecoder::new(data).take(MAX_MESSAGE_SIZE + 1);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        if decompressed.len() as u64 > MAX_MESSAGE_SIZE {
            return Err(CodecError::TooLarge);
        }
        Ok(decompressed)
    }

    pub fn encode_message(content: &MessageContent) -> Result<Vec<u8>, CodecError> {
        let (tag, body) = match content {
            MessageContent::InventoryRequest(req) => (INVENTORY_REQUEST_TAG, Self::encode_payload(req)?),
            MessageContent::InventoryResponse(resp) => (INVENTORY_RESPONSE_TAG, Self::encode_payload(resp)?),
            MessageContent::DataRequest(req) => (DATA_REQUEST_TAG, Self::encode_payload(req)?),
            MessageContent::DataResponse(resp) => (DATA_RESPONSE_TAG, Self::encode_payload(resp)?),
        };

        let compressed = Self::compress(&body)?;
        let mut frame = Vec::with_capacity(compressed.len() + 1);
        frame.push(tag);
        frame.extend_from_slice(&compressed);
        Ok(frame)
    }

    pub fn decode_message(data: &[u8]) -> Result<MessageContent, CodecError> {
        let (&tag, rest) = data.split_first().ok_or(CodecError::Empty)?;

        // Reject unknown shapes before touching the body
        if !(INVENTORY_REQUEST_TAG..=DATA_RESPONSE_TAG).contains(&tag) {
            return Err(CodecError::UnknownTag(tag));
        }

        let body = Self::decompress(rest)?;
        let content = match tag {
            INVENTORY_REQUEST_TAG => {
                MessageContent::InventoryRequest(Self::decode_payload::<InventoryRequest>(&body)?)
            }
            INVENTORY_RESPONSE_TAG => {
                MessageContent::InventoryResponse(Self::decode_payload::<InventoryResponse>(&body)?)
            }
            DATA_REQUEST_TAG => MessageContent::DataRequest(Self::decode_payload::<DataRequest>(&body)?),
            _ => MessageContent::DataResponse(Self::decode_payload::<DataResponse>(&body)?),
        };
        Ok(content)
    }

    pub fn encode_payload<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
        Ok(bincode_options().serialize(value)?)
    }

    pub fn decode_payload<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
        Ok(bincode_options().deserialize(bytes)?)
    }
}
