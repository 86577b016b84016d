/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Messages exchanged between nodes.
//!
//! [`Message`] groups them by how they are handled:
//! 1. [`GossipMessage`]s are fire-and-forget announcements processed by the node's dispatcher.
//! 2. [`SyncRequest`]s are answered by the [sync server](crate::block_sync::server).
//! 3. [`SyncResponse`]s are routed back to the [sync client](crate::block_sync::client) request that
//!    is waiting for them.
//!
//! ## Wire format
//!
//! A serialized message is one type tag byte followed by the message's fields, encoded with the same
//! big-endian layout as the stored chain data:
//!
//! |Message|Tag|Fields|
//! |---|---|---|
//! |`Hello`|`0x00`|height, genesis hash|
//! |`NewTransaction`|`0x10`|transaction|
//! |`NewBlock`|`0x11`|block, consensus|
//! |`NewBlockHeight`|`0x12`|height|
//! |`GetConsentedHeader`|`0x20`|height|
//! |`GetHeaders`|`0x21`|from height, count (4 bytes)|
//! |`GetBodies`|`0x22`|from height, count (4 bytes)|
//! |`ConsentedHeader`|`0x30`|header, consensus|
//! |`Headers`|`0x31`|list of headers|
//! |`Bodies`|`0x32`|list of bodies|

use std::io::{self, Read, Write};

use borsh::{BorshDeserialize, BorshSerialize};

use crate::block_sync::messages::{SyncRequest, SyncResponse};
use crate::types::{
    block::{Block, BlockHeader},
    consensus::Consensus,
    data_types::{BlockHeight, CryptoHash},
    serialization::{read_list, read_u32, read_u64, read_u8, write_list, write_u32, write_u64, write_u8},
    transaction::Transaction,
};

pub const HELLO: u8 = 0x00;
pub const NEW_TRANSACTION: u8 = 0x10;
pub const NEW_BLOCK: u8 = 0x11;
pub const NEW_BLOCK_HEIGHT: u8 = 0x12;
pub const GET_CONSENTED_HEADER: u8 = 0x20;
pub const GET_HEADERS: u8 = 0x21;
pub const GET_BODIES: u8 = 0x22;
pub const CONSENTED_HEADER: u8 = 0x30;
pub const HEADERS: u8 = 0x31;
pub const BODIES: u8 = 0x32;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    GossipMessage(GossipMessage),
    SyncRequest(SyncRequest),
    SyncResponse(SyncResponse),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GossipMessage {
    /// Sent once to each newly connected peer.
    Hello { height: BlockHeight, genesis_hash: CryptoHash },
    NewTransaction(Transaction),
    NewBlock { block: Block, consensus: Consensus },
    NewBlockHeight { height: BlockHeight },
}

impl Message {
    pub fn hello(height: BlockHeight, genesis_hash: CryptoHash) -> Message {
        Message::GossipMessage(GossipMessage::Hello { height, genesis_hash })
    }

    /// The type tag byte this message is serialized with.
    pub fn tag(&self) -> u8 {
        match self {
            Message::GossipMessage(GossipMessage::Hello { .. }) => HELLO,
            Message::GossipMessage(GossipMessage::NewTransaction(_)) => NEW_TRANSACTION,
            Message::GossipMessage(GossipMessage::NewBlock { .. }) => NEW_BLOCK,
            Message::GossipMessage(GossipMessage::NewBlockHeight { .. }) => NEW_BLOCK_HEIGHT,
            Message::SyncRequest(SyncRequest::GetConsentedHeader { .. }) => GET_CONSENTED_HEADER,
            Message::SyncRequest(SyncRequest::GetHeaders { .. }) => GET_HEADERS,
            Message::SyncRequest(SyncRequest::GetBodies { .. }) => GET_BODIES,
            Message::SyncResponse(SyncResponse::ConsentedHeader { .. }) => CONSENTED_HEADER,
            Message::SyncResponse(SyncResponse::Headers(_)) => HEADERS,
            Message::SyncResponse(SyncResponse::Bodies(_)) => BODIES,
        }
    }
}

impl From<GossipMessage> for Message {
    fn from(value: GossipMessage) -> Self {
        Message::GossipMessage(value)
    }
}

impl From<SyncRequest> for Message {
    fn from(value: SyncRequest) -> Self {
        Message::SyncRequest(value)
    }
}

impl From<SyncResponse> for Message {
    fn from(value: SyncResponse) -> Self {
        Message::SyncResponse(value)
    }
}

impl BorshSerialize for Message {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_u8(writer, self.tag())?;
        match self {
            Message::GossipMessage(gossip) => match gossip {
                GossipMessage::Hello { height, genesis_hash } => {
                    write_u64(writer, *height)?;
                    genesis_hash.serialize(writer)
                }
                GossipMessage::NewTransaction(transaction) => transaction.serialize(writer),
                GossipMessage::NewBlock { block, consensus } => {
                    block.serialize(writer)?;
                    consensus.serialize(writer)
                }
                GossipMessage::NewBlockHeight { height } => write_u64(writer, *height),
            },
            Message::SyncRequest(request) => match request {
                SyncRequest::GetConsentedHeader { height } => write_u64(writer, *height),
                SyncRequest::GetHeaders { from, count } | SyncRequest::GetBodies { from, count } => {
                    write_u64(writer, *from)?;
                    write_u32(writer, *count)
                }
            },
            Message::SyncResponse(response) => match response {
                SyncResponse::ConsentedHeader { header, consensus } => {
                    header.serialize(writer)?;
                    consensus.serialize(writer)
                }
                SyncResponse::Headers(headers) => write_list(writer, headers),
                SyncResponse::Bodies(bodies) => write_list(writer, bodies),
            },
        }
    }
}

impl BorshDeserialize for Message {
    fn deserialize_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        let message: Message = match read_u8(reader)? {
            HELLO => GossipMessage::Hello {
                height: read_u64(reader)?,
                genesis_hash: CryptoHash::deserialize_reader(reader)?,
            }
            .into(),
            NEW_TRANSACTION => GossipMessage::NewTransaction(Transaction::deserialize_reader(reader)?).into(),
            NEW_BLOCK => GossipMessage::NewBlock {
                block: Block::deserialize_reader(reader)?,
                consensus: Consensus::deserialize_reader(reader)?,
            }
            .into(),
            NEW_BLOCK_HEIGHT => GossipMessage::NewBlockHeight {
                height: read_u64(reader)?,
            }
            .into(),
            GET_CONSENTED_HEADER => SyncRequest::GetConsentedHeader {
                height: read_u64(reader)?,
            }
            .into(),
            GET_HEADERS => SyncRequest::GetHeaders {
                from: read_u64(reader)?,
                count: read_u32(reader)?,
            }
            .into(),
            GET_BODIES => SyncRequest::GetBodies {
                from: read_u64(reader)?,
                count: read_u32(reader)?,
            }
            .into(),
            CONSENTED_HEADER => SyncResponse::ConsentedHeader {
                header: BlockHeader::deserialize_reader(reader)?,
                consensus: Consensus::deserialize_reader(reader)?,
            }
            .into(),
            HEADERS => SyncResponse::Headers(read_list(reader)?).into(),
            BODIES => SyncResponse::Bodies(read_list(reader)?).into(),
            tag => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown message type tag {:#04x}", tag),
                ))
            }
        };
        Ok(message)
    }
}
