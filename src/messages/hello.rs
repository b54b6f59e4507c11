//! Handshake message
//!
//! The first eight body bytes (`protocol_version`, `network_num`) have the
//! same layout in every version so a peer's version can be read before a
//! version-specific factory is chosen.

use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

use super::{WireBody, SOURCE_ID_LEN};
use crate::protocol::{BodyReader, WireResult, SEQUENCED_FRAMING_VERSION};

/// First version whose hello carries the sender's node id
pub const NODE_ID_VERSION: u32 = SEQUENCED_FRAMING_VERSION;

/// Protocol handshake - sent on connection establishment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HelloMessage {
    pub protocol_version: u32,
    pub network_num: u32,
    /// Nil when received from a version that predates node ids
    pub node_id: Uuid,
}

impl HelloMessage {
    pub fn new(protocol_version: u32, network_num: u32, node_id: Uuid) -> Self {
        Self {
            protocol_version,
            network_num,
            node_id,
        }
    }
}

impl WireBody for HelloMessage {
    const NAME: &'static str = "hello";

    fn body_len(&self, version: u32) -> usize {
        let mut len = 8;
        if version >= NODE_ID_VERSION {
            len += SOURCE_ID_LEN;
        }
        len
    }

    fn encode_body(&self, version: u32, out: &mut BytesMut) -> WireResult<()> {
        out.put_u32_le(self.protocol_version);
        out.put_u32_le(self.network_num);
        if version >= NODE_ID_VERSION {
            out.put_slice(self.node_id.as_bytes());
        }
        Ok(())
    }

    fn decode_body(body: &Bytes, version: u32) -> WireResult<Self> {
        let mut reader = BodyReader::over(Self::NAME, body);
        let protocol_version = reader.u32_le("protocol version")?;
        let network_num = reader.u32_le("network number")?;
        let node_id = if version >= NODE_ID_VERSION {
            reader.uuid("node id")?
        } else {
            Uuid::nil()
        };
        reader.finish()?;

        Ok(Self {
            protocol_version,
            network_num,
            node_id,
        })
    }
}
