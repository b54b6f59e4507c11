//! Short-id lookups: `gettxs` requests transactions by short id, `txs`
//! answers with the contents.
//!
//! `txs` entries gained the transaction hash in v8; before that an entry is
//! `[short_id][len][contents]`.

use bytes::{BufMut, Bytes, BytesMut};

use super::{put_len, Sha256Hash, WireBody, HASH_LEN};
use crate::protocol::{BodyReader, WireResult};

/// First version whose `txs` entries carry the transaction hash
pub const TXS_HASH_VERSION: u32 = 8;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetTxsMessage {
    pub short_ids: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxEntry {
    pub short_id: u32,
    /// Zero when received from a version without entry hashes
    pub hash: Sha256Hash,
    pub contents: Bytes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxsMessage {
    pub txs: Vec<TxEntry>,
}

impl WireBody for GetTxsMessage {
    const NAME: &'static str = "gettxs";

    fn body_len(&self, _version: u32) -> usize {
        4 + 4 * self.short_ids.len()
    }

    fn encode_body(&self, _version: u32, out: &mut BytesMut) -> WireResult<()> {
        put_len(out, Self::NAME, "short id count", self.short_ids.len())?;
        for short_id in &self.short_ids {
            out.put_u32_le(*short_id);
        }
        Ok(())
    }

    fn decode_body(body: &Bytes, _version: u32) -> WireResult<Self> {
        let mut reader = BodyReader::over(Self::NAME, body);
        let count = reader.count("short id count", 4)?;
        let mut short_ids = Vec::with_capacity(count);
        for _ in 0..count {
            short_ids.push(reader.u32_le("short id")?);
        }
        reader.finish()?;
        Ok(Self { short_ids })
    }
}

impl TxsMessage {
    fn entry_overhead(version: u32) -> usize {
        if version >= TXS_HASH_VERSION {
            4 + HASH_LEN + 4
        } else {
            4 + 4
        }
    }
}

impl WireBody for TxsMessage {
    const NAME: &'static str = "txs";

    fn body_len(&self, version: u32) -> usize {
        let overhead = Self::entry_overhead(version);
        4 + self
            .txs
            .iter()
            .map(|entry| overhead + entry.contents.len())
            .sum::<usize>()
    }

    fn encode_body(&self, version: u32, out: &mut BytesMut) -> WireResult<()> {
        put_len(out, Self::NAME, "entry count", self.txs.len())?;
        for entry in &self.txs {
            out.put_u32_le(entry.short_id);
            if version >= TXS_HASH_VERSION {
                out.put_slice(entry.hash.as_bytes());
            }
            put_len(out, Self::NAME, "contents length", entry.contents.len())?;
            out.put_slice(&entry.contents);
        }
        Ok(())
    }

    fn decode_body(body: &Bytes, version: u32) -> WireResult<Self> {
        let mut reader = BodyReader::over(Self::NAME, body);
        let count = reader.count("entry count", Self::entry_overhead(version))?;
        let mut txs = Vec::with_capacity(count);

        for _ in 0..count {
            let short_id = reader.u32_le("short id")?;
            let hash = if version >= TXS_HASH_VERSION {
                reader.hash("transaction hash")?
            } else {
                Sha256Hash::default()
            };
            let len = reader.u32_le("contents length")? as usize;
            let contents = reader.bytes(len, "contents")?;
            txs.push(TxEntry {
                short_id,
                hash,
                contents,
            });
        }

        reader.finish()?;
        Ok(Self { txs })
    }
}
