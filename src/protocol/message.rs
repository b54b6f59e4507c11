//! Protocol message definitions
//!
//! [`MessageKind`] names every message the protocol knows and the version
//! that introduced it. [`Message`] is the canonical decoded form, shared by
//! every version.

use std::fmt;

use bytes::{Bytes, BytesMut};

use super::{BodyReader, Command, WireError, WireResult};
use crate::messages::{
    read_broadcast_prefix, write_broadcast_prefix, BlockHoldingMessage, BroadcastMessage,
    BroadcastPrefix, CleanupMessage, GetTxsMessage, HelloMessage, KeyMessage,
    NotificationMessage, PingMessage, PongMessage, TxMessage, TxsMessage, WireBody,
    TXS_HASH_VERSION,
};

/// Message type identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageKind {
    Hello,
    Ack,
    Ping,
    Pong,
    Broadcast,
    Tx,
    Key,
    GetTxs,
    Txs,
    BlockHolding,
    Disconnect,
    Notification,
    TxCleanup,
    BlockConfirmation,
}

/// Split of a body into a fixed-width region and an opaque tail.
///
/// Two versions of a kind can be transcoded without touching the tail when
/// their layouts report the same `tail_revision`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialLayout {
    pub fixed_len: usize,
    pub tail_revision: u8,
}

impl MessageKind {
    pub const ALL: [MessageKind; 14] = [
        MessageKind::Hello,
        MessageKind::Ack,
        MessageKind::Ping,
        MessageKind::Pong,
        MessageKind::Broadcast,
        MessageKind::Tx,
        MessageKind::Key,
        MessageKind::GetTxs,
        MessageKind::Txs,
        MessageKind::BlockHolding,
        MessageKind::Disconnect,
        MessageKind::Notification,
        MessageKind::TxCleanup,
        MessageKind::BlockConfirmation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MessageKind::Hello => "hello",
            MessageKind::Ack => "ack",
            MessageKind::Ping => "ping",
            MessageKind::Pong => "pong",
            MessageKind::Broadcast => "broadcast",
            MessageKind::Tx => "tx",
            MessageKind::Key => "key",
            MessageKind::GetTxs => "gettxs",
            MessageKind::Txs => "txs",
            MessageKind::BlockHolding => "blockhold",
            MessageKind::Disconnect => "disconnect",
            MessageKind::Notification => "notify",
            MessageKind::TxCleanup => "txclnup",
            MessageKind::BlockConfirmation => "blkcnfrm",
        }
    }

    /// Command tag written in the header
    pub fn command(self) -> Command {
        Command::new(self.name())
    }

    pub fn from_command(command: &Command) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.command() == *command)
    }

    /// Version that introduced the kind
    pub fn introduced_in(self) -> u32 {
        match self {
            MessageKind::BlockHolding => 5,
            MessageKind::Notification => 9,
            MessageKind::TxCleanup | MessageKind::BlockConfirmation => 10,
            _ => 1,
        }
    }

    pub fn is_available_in(self, version: u32) -> bool {
        version >= self.introduced_in()
    }

    /// Kinds whose body opens with the broadcast prefix
    pub fn is_broadcast(self) -> bool {
        matches!(
            self,
            MessageKind::Broadcast
                | MessageKind::Tx
                | MessageKind::Key
                | MessageKind::BlockHolding
                | MessageKind::TxCleanup
                | MessageKind::BlockConfirmation
        )
    }

    /// Body split for partial conversion, or `None` when the kind must
    /// always be converted whole
    pub fn partial_layout(self, version: u32) -> Option<PartialLayout> {
        let fixed = |fixed_len| {
            Some(PartialLayout {
                fixed_len,
                tail_revision: 0,
            })
        };

        match self {
            // Hellos describe the link itself and are never relayed
            MessageKind::Hello => None,
            MessageKind::Ack | MessageKind::Disconnect | MessageKind::GetTxs => fixed(0),
            MessageKind::Ping => fixed(PingMessage::default().body_len(version)),
            MessageKind::Pong => fixed(PongMessage::default().body_len(version)),
            MessageKind::Broadcast => fixed(BroadcastMessage::fixed_len(version)),
            MessageKind::Tx => fixed(TxMessage::fixed_len(version)),
            MessageKind::Key => fixed(KeyMessage::default().body_len(version)),
            MessageKind::BlockHolding | MessageKind::TxCleanup | MessageKind::BlockConfirmation => {
                fixed(BroadcastPrefix::wire_len(version))
            }
            MessageKind::Notification => fixed(2),
            MessageKind::Txs => Some(PartialLayout {
                fixed_len: 0,
                tail_revision: if version >= TXS_HASH_VERSION { 2 } else { 1 },
            }),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// All possible protocol messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Protocol handshake - sent on connection establishment
    Hello(HelloMessage),
    /// Acknowledgment of Hello
    Ack,
    Ping(PingMessage),
    Pong(PongMessage),
    /// Block broadcast, possibly encrypted
    Broadcast(BroadcastMessage),
    Tx(TxMessage),
    /// Releases the key for an encrypted broadcast
    Key(KeyMessage),
    GetTxs(GetTxsMessage),
    Txs(TxsMessage),
    BlockHolding(BlockHoldingMessage),
    /// Graceful disconnect
    Disconnect,
    Notification(NotificationMessage),
    TxCleanup(CleanupMessage),
    BlockConfirmation(CleanupMessage),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Hello(_) => MessageKind::Hello,
            Message::Ack => MessageKind::Ack,
            Message::Ping(_) => MessageKind::Ping,
            Message::Pong(_) => MessageKind::Pong,
            Message::Broadcast(_) => MessageKind::Broadcast,
            Message::Tx(_) => MessageKind::Tx,
            Message::Key(_) => MessageKind::Key,
            Message::GetTxs(_) => MessageKind::GetTxs,
            Message::Txs(_) => MessageKind::Txs,
            Message::BlockHolding(_) => MessageKind::BlockHolding,
            Message::Disconnect => MessageKind::Disconnect,
            Message::Notification(_) => MessageKind::Notification,
            Message::TxCleanup(_) => MessageKind::TxCleanup,
            Message::BlockConfirmation(_) => MessageKind::BlockConfirmation,
        }
    }

    /// Encoded body length under `version`
    pub fn body_len(&self, version: u32) -> usize {
        match self {
            Message::Hello(m) => m.body_len(version),
            Message::Ack | Message::Disconnect => 0,
            Message::Ping(m) => m.body_len(version),
            Message::Pong(m) => m.body_len(version),
            Message::Broadcast(m) => m.body_len(version),
            Message::Tx(m) => m.body_len(version),
            Message::Key(m) => m.body_len(version),
            Message::GetTxs(m) => m.body_len(version),
            Message::Txs(m) => m.body_len(version),
            Message::BlockHolding(m) => m.body_len(version),
            Message::Notification(m) => m.body_len(version),
            Message::TxCleanup(m) | Message::BlockConfirmation(m) => m.body_len(version),
        }
    }

    pub fn encode_body(&self, version: u32, out: &mut BytesMut) -> WireResult<()> {
        match self {
            Message::Hello(m) => m.encode_body(version, out),
            Message::Ack | Message::Disconnect => Ok(()),
            Message::Ping(m) => m.encode_body(version, out),
            Message::Pong(m) => m.encode_body(version, out),
            Message::Broadcast(m) => m.encode_body(version, out),
            Message::Tx(m) => m.encode_body(version, out),
            Message::Key(m) => m.encode_body(version, out),
            Message::GetTxs(m) => m.encode_body(version, out),
            Message::Txs(m) => m.encode_body(version, out),
            Message::BlockHolding(m) => m.encode_body(version, out),
            Message::Notification(m) => m.encode_body(version, out),
            Message::TxCleanup(m) | Message::BlockConfirmation(m) => m.encode_body(version, out),
        }
    }

    /// Decode a `kind` body written under `version`
    pub fn decode_body(kind: MessageKind, body: &Bytes, version: u32) -> WireResult<Self> {
        Ok(match kind {
            MessageKind::Hello => Message::Hello(HelloMessage::decode_body(body, version)?),
            MessageKind::Ack => {
                BodyReader::over("ack", body).finish()?;
                Message::Ack
            }
            MessageKind::Ping => Message::Ping(PingMessage::decode_body(body, version)?),
            MessageKind::Pong => Message::Pong(PongMessage::decode_body(body, version)?),
            MessageKind::Broadcast => {
                Message::Broadcast(BroadcastMessage::decode_body(body, version)?)
            }
            MessageKind::Tx => Message::Tx(TxMessage::decode_body(body, version)?),
            MessageKind::Key => Message::Key(KeyMessage::decode_body(body, version)?),
            MessageKind::GetTxs => Message::GetTxs(GetTxsMessage::decode_body(body, version)?),
            MessageKind::Txs => Message::Txs(TxsMessage::decode_body(body, version)?),
            MessageKind::BlockHolding => {
                Message::BlockHolding(BlockHoldingMessage::decode_body(body, version)?)
            }
            MessageKind::Disconnect => {
                BodyReader::over("disconnect", body).finish()?;
                Message::Disconnect
            }
            MessageKind::Notification => {
                Message::Notification(NotificationMessage::decode_body(body, version)?)
            }
            MessageKind::TxCleanup => Message::TxCleanup(CleanupMessage::decode_body(body, version)?),
            MessageKind::BlockConfirmation => {
                Message::BlockConfirmation(CleanupMessage::decode_body(body, version)?)
            }
        })
    }

    /// Network number of a broadcast-family message
    pub fn network_num(&self) -> Option<u32> {
        match self {
            Message::Broadcast(m) => Some(m.network_num),
            Message::Tx(m) => Some(m.network_num),
            Message::Key(m) => Some(m.network_num),
            Message::BlockHolding(m) => Some(m.network_num),
            Message::TxCleanup(m) | Message::BlockConfirmation(m) => Some(m.network_num),
            _ => None,
        }
    }

    /// Overwrite the network number; no-op outside the broadcast family
    pub fn set_network_num(&mut self, network_num: u32) {
        match self {
            Message::Broadcast(m) => m.network_num = network_num,
            Message::Tx(m) => m.network_num = network_num,
            Message::Key(m) => m.network_num = network_num,
            Message::BlockHolding(m) => m.network_num = network_num,
            Message::TxCleanup(m) | Message::BlockConfirmation(m) => m.network_num = network_num,
            _ => {}
        }
    }

    /// Decode only the fixed region of a body; see [`MessageKind::partial_layout`].
    /// The tail fields of the result are empty.
    pub(crate) fn decode_fixed(kind: MessageKind, fixed: &Bytes, version: u32) -> WireResult<Self> {
        match kind {
            MessageKind::GetTxs => Ok(Message::GetTxs(GetTxsMessage::default())),
            MessageKind::Txs => Ok(Message::Txs(TxsMessage::default())),
            MessageKind::TxCleanup | MessageKind::BlockConfirmation => {
                let mut reader = BodyReader::over(kind.name(), fixed);
                let (message_hash, network_num, source_id) =
                    read_broadcast_prefix(&mut reader, version)?;
                reader.finish()?;
                let cleanup = CleanupMessage {
                    message_hash,
                    network_num,
                    source_id,
                    ..Default::default()
                };
                Ok(if kind == MessageKind::TxCleanup {
                    Message::TxCleanup(cleanup)
                } else {
                    Message::BlockConfirmation(cleanup)
                })
            }
            MessageKind::Hello => Err(WireError::malformed("hello", "no fixed region")),
            _ => Self::decode_body(kind, fixed, version),
        }
    }

    /// Encode only the fixed region of the body
    pub(crate) fn encode_fixed(&self, version: u32, out: &mut BytesMut) -> WireResult<()> {
        match self {
            Message::GetTxs(_) | Message::Txs(_) => Ok(()),
            Message::TxCleanup(m) | Message::BlockConfirmation(m) => {
                write_broadcast_prefix(out, &m.message_hash, m.network_num, &m.source_id, version);
                Ok(())
            }
            _ => self.encode_body(version, out),
        }
    }
}
