//! Transaction cleanup and block confirmation notices
//!
//! Both kinds share a layout: the broadcast prefix followed by the short ids
//! and transaction hashes the receiver may forget.

use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

use super::{
    put_len, read_broadcast_prefix, write_broadcast_prefix, BroadcastPrefix, Sha256Hash, WireBody,
    HASH_LEN,
};
use crate::protocol::{BodyReader, WireResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupMessage {
    /// Block hash for confirmations, a cleanup id for transaction cleanups
    pub message_hash: Sha256Hash,
    pub network_num: u32,
    pub source_id: Uuid,
    pub short_ids: Vec<u32>,
    pub tx_hashes: Vec<Sha256Hash>,
}

impl WireBody for CleanupMessage {
    const NAME: &'static str = "cleanup";

    fn body_len(&self, version: u32) -> usize {
        BroadcastPrefix::wire_len(version)
            + 4
            + 4 * self.short_ids.len()
            + 4
            + HASH_LEN * self.tx_hashes.len()
    }

    fn encode_body(&self, version: u32, out: &mut BytesMut) -> WireResult<()> {
        write_broadcast_prefix(out, &self.message_hash, self.network_num, &self.source_id, version);
        put_len(out, Self::NAME, "short id count", self.short_ids.len())?;
        for short_id in &self.short_ids {
            out.put_u32_le(*short_id);
        }
        put_len(out, Self::NAME, "hash count", self.tx_hashes.len())?;
        for hash in &self.tx_hashes {
            out.put_slice(hash.as_bytes());
        }
        Ok(())
    }

    fn decode_body(body: &Bytes, version: u32) -> WireResult<Self> {
        let mut reader = BodyReader::over(Self::NAME, body);
        let (message_hash, network_num, source_id) = read_broadcast_prefix(&mut reader, version)?;

        let sid_count = reader.count("short id count", 4)?;
        let mut short_ids = Vec::with_capacity(sid_count);
        for _ in 0..sid_count {
            short_ids.push(reader.u32_le("short id")?);
        }

        let hash_count = reader.count("hash count", HASH_LEN)?;
        let mut tx_hashes = Vec::with_capacity(hash_count);
        for _ in 0..hash_count {
            tx_hashes.push(reader.hash("transaction hash")?);
        }

        reader.finish()?;
        Ok(Self {
            message_hash,
            network_num,
            source_id,
            short_ids,
            tx_hashes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_roundtrip() {
        let msg = CleanupMessage {
            message_hash: Sha256Hash::new([1u8; 32]),
            network_num: 5,
            source_id: Uuid::from_bytes([2u8; 16]),
            short_ids: vec![10, 11, 12],
            tx_hashes: vec![Sha256Hash::new([3u8; 32])],
        };
        let mut out = BytesMut::new();
        msg.encode_body(22, &mut out).unwrap();
        assert_eq!(out.len(), 52 + 4 + 12 + 4 + 32);
        assert_eq!(CleanupMessage::decode_body(&out.freeze(), 22).unwrap(), msg);
    }

    #[test]
    fn test_cleanup_count_overflow() {
        let mut out = BytesMut::new();
        write_broadcast_prefix(&mut out, &Sha256Hash::default(), 5, &Uuid::nil(), 22);
        out.put_u32_le(u32::MAX);
        assert!(CleanupMessage::decode_body(&out.freeze(), 22).is_err());
    }
}
