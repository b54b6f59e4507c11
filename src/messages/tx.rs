//! Transaction message
//!
//! ```text
//! v1-v3    [hash][short_id][tx_val]
//! v4-v6    [hash][network][short_id][tx_val]
//! v7-v10   [hash][network][source][short_id][tx_val]
//! v11-v14  [hash][network][source][short_id][quota_type 1][tx_val]
//! v15-v19  [hash][network][source][short_id][quota_type 1][timestamp 4][tx_val]
//! v20+     [hash][network][source][short_id][transaction_flag 2][timestamp 4][tx_val]
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

use super::{
    read_broadcast_prefix, write_broadcast_prefix, BroadcastPrefix, QuotaType, Sha256Hash,
    TransactionFlag, WireBody,
};
use crate::protocol::{BodyReader, WireError, WireResult};

/// Short id meaning "none assigned"
pub const NULL_TX_SID: u32 = 0;

pub const QUOTA_TYPE_VERSION: u32 = 11;
pub const TIMESTAMP_VERSION: u32 = 15;
pub const TRANSACTION_FLAG_VERSION: u32 = 20;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxMessage {
    pub message_hash: Sha256Hash,
    pub network_num: u32,
    pub source_id: Uuid,
    pub short_id: u32,
    pub transaction_flag: TransactionFlag,
    /// Seconds since the epoch, zero when unknown
    pub timestamp: u32,
    /// Raw transaction bytes, identical in every version
    pub tx_val: Bytes,
}

impl TxMessage {
    /// Bytes before `tx_val` under `version`
    pub fn fixed_len(version: u32) -> usize {
        let mut len = BroadcastPrefix::wire_len(version) + 4;
        if version >= TRANSACTION_FLAG_VERSION {
            len += 2;
        } else if version >= QUOTA_TYPE_VERSION {
            len += 1;
        }
        if version >= TIMESTAMP_VERSION {
            len += 4;
        }
        len
    }

    pub fn has_short_id(&self) -> bool {
        self.short_id != NULL_TX_SID
    }
}

impl WireBody for TxMessage {
    const NAME: &'static str = "tx";

    fn body_len(&self, version: u32) -> usize {
        Self::fixed_len(version) + self.tx_val.len()
    }

    fn encode_body(&self, version: u32, out: &mut BytesMut) -> WireResult<()> {
        write_broadcast_prefix(out, &self.message_hash, self.network_num, &self.source_id, version);
        out.put_u32_le(self.short_id);
        if version >= TRANSACTION_FLAG_VERSION {
            out.put_u16_le(self.transaction_flag.to_bits());
        } else if version >= QUOTA_TYPE_VERSION {
            out.put_u8(QuotaType::from_flag(self.transaction_flag) as u8);
        }
        if version >= TIMESTAMP_VERSION {
            out.put_u32_le(self.timestamp);
        }
        out.put_slice(&self.tx_val);
        Ok(())
    }

    fn decode_body(body: &Bytes, version: u32) -> WireResult<Self> {
        let mut reader = BodyReader::over(Self::NAME, body);
        let (message_hash, network_num, source_id) = read_broadcast_prefix(&mut reader, version)?;
        let short_id = reader.u32_le("short id")?;

        let transaction_flag = if version >= TRANSACTION_FLAG_VERSION {
            TransactionFlag::from_bits(reader.u16_le("transaction flag")?)
        } else if version >= QUOTA_TYPE_VERSION {
            let quota = reader.u8("quota type")?;
            QuotaType::from_u8(quota)
                .ok_or_else(|| WireError::malformed(Self::NAME, format!("unknown quota type {}", quota)))?
                .to_flag()
        } else {
            TransactionFlag::default()
        };

        let timestamp = if version >= TIMESTAMP_VERSION {
            reader.u32_le("timestamp")?
        } else {
            0
        };

        Ok(Self {
            message_hash,
            network_num,
            source_id,
            short_id,
            transaction_flag,
            timestamp,
            tx_val: reader.rest(),
        })
    }
}
