//! Block broadcast message

use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

use super::{read_broadcast_prefix, write_broadcast_prefix, BroadcastPrefix, BroadcastType, Sha256Hash, WireBody};
use crate::protocol::{BodyReader, WireError, WireResult};

/// First version whose broadcast carries a broadcast type
pub const BROADCAST_TYPE_VERSION: u32 = 12;

/// A (possibly encrypted) block relayed through the network
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastMessage {
    pub message_hash: Sha256Hash,
    pub network_num: u32,
    pub source_id: Uuid,
    /// Older versions only ever broadcast full blocks
    pub broadcast_type: BroadcastType,
    pub is_encrypted: bool,
    /// Block bytes, identical in every version
    pub blob: Bytes,
}

impl BroadcastMessage {
    /// Bytes before the blob under `version`
    pub fn fixed_len(version: u32) -> usize {
        let mut len = BroadcastPrefix::wire_len(version);
        if version >= BROADCAST_TYPE_VERSION {
            len += BroadcastType::WIRE_LEN;
        }
        len + 1
    }
}

impl WireBody for BroadcastMessage {
    const NAME: &'static str = "broadcast";

    fn body_len(&self, version: u32) -> usize {
        Self::fixed_len(version) + self.blob.len()
    }

    fn encode_body(&self, version: u32, out: &mut BytesMut) -> WireResult<()> {
        write_broadcast_prefix(out, &self.message_hash, self.network_num, &self.source_id, version);
        if version >= BROADCAST_TYPE_VERSION {
            out.put_slice(self.broadcast_type.as_bytes());
        }
        out.put_u8(self.is_encrypted as u8);
        out.put_slice(&self.blob);
        Ok(())
    }

    fn decode_body(body: &Bytes, version: u32) -> WireResult<Self> {
        let mut reader = BodyReader::over(Self::NAME, body);
        let (message_hash, network_num, source_id) = read_broadcast_prefix(&mut reader, version)?;

        let broadcast_type = if version >= BROADCAST_TYPE_VERSION {
            let tag = reader.take(BroadcastType::WIRE_LEN, "broadcast type")?;
            BroadcastType::from_bytes(tag).ok_or_else(|| {
                WireError::malformed(Self::NAME, format!("unknown broadcast type {:02x?}", tag))
            })?
        } else {
            BroadcastType::Block
        };

        let is_encrypted = match reader.u8("encryption flag")? {
            0 => false,
            1 => true,
            other => {
                return Err(WireError::malformed(
                    Self::NAME,
                    format!("invalid encryption flag {}", other),
                ))
            }
        };

        Ok(Self {
            message_hash,
            network_num,
            source_id,
            broadcast_type,
            is_encrypted,
            blob: reader.rest(),
        })
    }
}
