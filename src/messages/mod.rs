//! Message kinds
//!
//! One canonical in-memory type per message kind. The byte layout of each
//! kind depends on the protocol version, so every type implements
//! [`WireBody`] with the version as a parameter instead of having a separate
//! type per version.
//!
//! Broadcast-family kinds (blocks, transactions, keys, block holding and
//! cleanup notices) start their body with a fixed prefix:
//!
//! ```text
//! [hash 32]  v4+ [network_num 4 LE]  v7+ [source_id 16]  ... kind specific ...
//! ```

mod block_holding;
mod broadcast;
mod cleanup;
mod hello;
mod key;
mod notification;
mod ping;
mod tx;
mod txs;
mod types;

pub use block_holding::BlockHoldingMessage;
pub use broadcast::{BroadcastMessage, BROADCAST_TYPE_VERSION};
pub use cleanup::CleanupMessage;
pub use hello::{HelloMessage, NODE_ID_VERSION};
pub use key::{KeyMessage, KEY_LEN};
pub use notification::{notification_codes, NotificationMessage};
pub use ping::{PingMessage, PongMessage, NONCE_VERSION, PONG_TIMESTAMP_VERSION};
pub use tx::{
    TxMessage, NULL_TX_SID, QUOTA_TYPE_VERSION, TIMESTAMP_VERSION, TRANSACTION_FLAG_VERSION,
};
pub use txs::{GetTxsMessage, TxEntry, TxsMessage, TXS_HASH_VERSION};
pub use types::{BroadcastType, QuotaType, Sha256Hash, TransactionFlag, HASH_LEN, SOURCE_ID_LEN};

use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::protocol::{BodyReader, WireError, WireResult};

/// First version whose broadcast prefix carries the network number
pub const NETWORK_NUM_VERSION: u32 = 4;

/// First version whose broadcast prefix carries the source-peer id
pub const SOURCE_ID_VERSION: u32 = 7;

/// Network number meaning "not set"
pub const UNSET_NETWORK_NUM: u32 = 0;

/// Version-parameterized body codec
pub trait WireBody: Sized {
    /// Kind name used in error messages
    const NAME: &'static str;

    /// Encoded body length under `version`
    fn body_len(&self, version: u32) -> usize;

    /// Append the body to `out`. `out` has room for `body_len` bytes.
    /// Fails when a count or length does not fit its u32 field.
    fn encode_body(&self, version: u32, out: &mut BytesMut) -> WireResult<()>;

    /// Decode a body written under `version`
    fn decode_body(body: &Bytes, version: u32) -> WireResult<Self>;
}

/// Fixed-offset fields at the start of a broadcast-family body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastPrefix {
    pub message_hash: Sha256Hash,
    /// Absent before v4
    pub network_num: Option<u32>,
    /// Absent before v7
    pub source_id: Option<Uuid>,
}

impl BroadcastPrefix {
    /// Width of the prefix under `version`
    pub fn wire_len(version: u32) -> usize {
        let mut len = HASH_LEN;
        if version >= NETWORK_NUM_VERSION {
            len += 4;
        }
        if version >= SOURCE_ID_VERSION {
            len += SOURCE_ID_LEN;
        }
        len
    }

    /// Offset of the source id within the body, if the version carries one
    pub fn source_id_offset(version: u32) -> Option<usize> {
        (version >= SOURCE_ID_VERSION).then(|| HASH_LEN + 4)
    }

    /// Decode the prefix from the start of a body; the rest is ignored
    pub fn parse(body: &[u8], version: u32) -> WireResult<Self> {
        let mut reader = BodyReader::new("broadcast prefix", body);

        let message_hash = reader.hash("message hash")?;
        let network_num = if version >= NETWORK_NUM_VERSION {
            Some(reader.u32_le("network number")?)
        } else {
            None
        };
        let source_id = if version >= SOURCE_ID_VERSION {
            Some(reader.uuid("source id")?)
        } else {
            None
        };

        Ok(Self {
            message_hash,
            network_num,
            source_id,
        })
    }
}

/// Write the broadcast prefix, skipping fields `version` does not carry
pub(crate) fn write_broadcast_prefix(
    out: &mut BytesMut,
    message_hash: &Sha256Hash,
    network_num: u32,
    source_id: &Uuid,
    version: u32,
) {
    out.put_slice(message_hash.as_bytes());
    if version >= NETWORK_NUM_VERSION {
        out.put_u32_le(network_num);
    }
    if version >= SOURCE_ID_VERSION {
        out.put_slice(source_id.as_bytes());
    }
}

/// Write a u32 count or length prefix
pub(crate) fn put_len(
    out: &mut BytesMut,
    kind: &'static str,
    field: &str,
    len: usize,
) -> WireResult<()> {
    let len = u32::try_from(len)
        .map_err(|_| WireError::malformed(kind, format!("{} of {} exceeds u32", field, len)))?;
    out.put_u32_le(len);
    Ok(())
}

/// Read the broadcast prefix, filling fields the version lacks with
/// [`UNSET_NETWORK_NUM`] and the nil id
pub(crate) fn read_broadcast_prefix(
    reader: &mut BodyReader<'_>,
    version: u32,
) -> WireResult<(Sha256Hash, u32, Uuid)> {
    let message_hash = reader.hash("message hash")?;
    let network_num = if version >= NETWORK_NUM_VERSION {
        reader.u32_le("network number")?
    } else {
        UNSET_NETWORK_NUM
    };
    let source_id = if version >= SOURCE_ID_VERSION {
        reader.uuid("source id")?
    } else {
        Uuid::nil()
    };
    Ok((message_hash, network_num, source_id))
}
