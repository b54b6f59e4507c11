//! Encryption key release for a previously broadcast block

use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

use super::{read_broadcast_prefix, write_broadcast_prefix, BroadcastPrefix, Sha256Hash, WireBody};
use crate::protocol::{BodyReader, WireResult};

pub const KEY_LEN: usize = 32;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMessage {
    pub message_hash: Sha256Hash,
    pub network_num: u32,
    pub source_id: Uuid,
    pub key: [u8; KEY_LEN],
}

impl WireBody for KeyMessage {
    const NAME: &'static str = "key";

    fn body_len(&self, version: u32) -> usize {
        BroadcastPrefix::wire_len(version) + KEY_LEN
    }

    fn encode_body(&self, version: u32, out: &mut BytesMut) -> WireResult<()> {
        write_broadcast_prefix(out, &self.message_hash, self.network_num, &self.source_id, version);
        out.put_slice(&self.key);
        Ok(())
    }

    fn decode_body(body: &Bytes, version: u32) -> WireResult<Self> {
        let mut reader = BodyReader::over(Self::NAME, body);
        let (message_hash, network_num, source_id) = read_broadcast_prefix(&mut reader, version)?;
        let key = reader.array::<KEY_LEN>("key")?;
        reader.finish()?;

        Ok(Self {
            message_hash,
            network_num,
            source_id,
            key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_roundtrip_and_width() {
        let msg = KeyMessage {
            message_hash: Sha256Hash::new([4u8; 32]),
            network_num: 2,
            source_id: Uuid::from_bytes([6u8; 16]),
            key: [8u8; KEY_LEN],
        };
        let mut out = BytesMut::new();
        msg.encode_body(22, &mut out).unwrap();
        assert_eq!(out.len(), 84);
        assert_eq!(KeyMessage::decode_body(&out.freeze(), 22).unwrap(), msg);
        assert_eq!(msg.body_len(3), 64);
    }
}
