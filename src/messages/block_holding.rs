//! Request to hold back a block the sender is already propagating

use bytes::{Bytes, BytesMut};
use uuid::Uuid;

use super::{read_broadcast_prefix, write_broadcast_prefix, BroadcastPrefix, Sha256Hash, WireBody};
use crate::protocol::{BodyReader, WireResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockHoldingMessage {
    pub block_hash: Sha256Hash,
    pub network_num: u32,
    pub source_id: Uuid,
}

impl WireBody for BlockHoldingMessage {
    const NAME: &'static str = "blockhold";

    fn body_len(&self, version: u32) -> usize {
        BroadcastPrefix::wire_len(version)
    }

    fn encode_body(&self, version: u32, out: &mut BytesMut) -> WireResult<()> {
        write_broadcast_prefix(out, &self.block_hash, self.network_num, &self.source_id, version);
        Ok(())
    }

    fn decode_body(body: &Bytes, version: u32) -> WireResult<Self> {
        let mut reader = BodyReader::over(Self::NAME, body);
        let (block_hash, network_num, source_id) = read_broadcast_prefix(&mut reader, version)?;
        reader.finish()?;

        Ok(Self {
            block_hash,
            network_num,
            source_id,
        })
    }
}
