//! Protocol codec for encoding/decoding messages
//!
//! Encoding writes the header and every field at precomputed offsets into a
//! single buffer sized up front. Decoding reads a [`WireMessage`] body with
//! the layout of the version the message was framed under.

use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

use super::{CommonHeader, ControlFlags, Framing, Message, WireError, WireMessage, WireResult};
use crate::messages::{Sha256Hash, HASH_LEN, SOURCE_ID_LEN};

/// Encode `message` under `version` with the default (valid) control flags
pub fn encode(message: &Message, version: u32) -> WireResult<WireMessage> {
    encode_with_flags(message, version, ControlFlags::VALID)
}

/// Encode `message` under `version`. `flags` is ignored by the legacy framing.
pub fn encode_with_flags(
    message: &Message,
    version: u32,
    flags: ControlFlags,
) -> WireResult<WireMessage> {
    let kind = message.kind();
    if !kind.is_available_in(version) {
        return Err(WireError::UnrecognizedCommand {
            command: kind.command().as_str(),
            version,
        });
    }

    let framing = Framing::for_version(version);
    let body_len = message.body_len(version);
    let payload_len = body_len + framing.control_flag_len();
    let payload_len_field = u32::try_from(payload_len)
        .map_err(|_| WireError::malformed(kind.name(), "payload exceeds u32 length field"))?;

    let header = CommonHeader::new(kind.command(), payload_len_field);
    let mut buf = BytesMut::with_capacity(framing.header_len() + payload_len);
    header.write(framing, &mut buf);
    message.encode_body(version, &mut buf)?;
    debug_assert_eq!(buf.len(), framing.header_len() + body_len);

    if framing == Framing::Sequenced {
        buf.put_u8(flags.bits());
    }

    // `version` may not carry every field of `message`; decode from the bytes
    Ok(WireMessage::from_parts(buf.freeze(), version, kind, header))
}

/// Decode the canonical message carried by `wire`
pub fn decode(wire: &WireMessage) -> WireResult<Message> {
    Message::decode_body(wire.kind(), &wire.body_bytes(), wire.version())
}

/// Bounds-checked little-endian reader over a message body
pub struct BodyReader<'a> {
    kind: &'static str,
    buf: &'a [u8],
    /// Owning buffer, when available, so tails can be sliced without copying
    source: Option<&'a Bytes>,
    pos: usize,
}

impl<'a> BodyReader<'a> {
    pub fn new(kind: &'static str, buf: &'a [u8]) -> Self {
        Self {
            kind,
            buf,
            source: None,
            pos: 0,
        }
    }

    pub fn over(kind: &'static str, bytes: &'a Bytes) -> Self {
        Self {
            kind,
            buf: bytes.as_ref(),
            source: Some(bytes),
            pos: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn take(&mut self, n: usize, field: &str) -> WireResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(WireError::malformed(
                self.kind,
                format!(
                    "truncated {}: need {} bytes, {} left",
                    field,
                    n,
                    self.remaining()
                ),
            ));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn u8(&mut self, field: &str) -> WireResult<u8> {
        Ok(self.take(1, field)?[0])
    }

    pub fn u16_le(&mut self, field: &str) -> WireResult<u16> {
        Ok(u16::from_le_bytes(self.array::<2>(field)?))
    }

    pub fn u32_le(&mut self, field: &str) -> WireResult<u32> {
        Ok(u32::from_le_bytes(self.array::<4>(field)?))
    }

    pub fn u64_le(&mut self, field: &str) -> WireResult<u64> {
        Ok(u64::from_le_bytes(self.array::<8>(field)?))
    }

    pub fn array<const N: usize>(&mut self, field: &str) -> WireResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }

    pub fn hash(&mut self, field: &str) -> WireResult<Sha256Hash> {
        Ok(Sha256Hash::new(self.array::<HASH_LEN>(field)?))
    }

    pub fn uuid(&mut self, field: &str) -> WireResult<Uuid> {
        Ok(Uuid::from_bytes(self.array::<SOURCE_ID_LEN>(field)?))
    }

    /// `n` bytes as an owned buffer, zero-copy when the reader has a source
    pub fn bytes(&mut self, n: usize, field: &str) -> WireResult<Bytes> {
        let start = self.pos;
        let slice = self.take(n, field)?;
        Ok(match self.source {
            Some(source) => source.slice(start..start + n),
            None => Bytes::copy_from_slice(slice),
        })
    }

    /// Everything left in the body
    pub fn rest(&mut self) -> Bytes {
        let n = self.remaining();
        self.bytes(n, "tail").unwrap_or_default()
    }

    /// Count prefix for a list of `item_len`-byte entries, checked against
    /// the bytes actually left so a hostile count cannot force a huge
    /// allocation
    pub fn count(&mut self, field: &str, item_len: usize) -> WireResult<usize> {
        let count = self.u32_le(field)? as usize;
        if count.saturating_mul(item_len) > self.remaining() {
            return Err(WireError::malformed(
                self.kind,
                format!("{} of {} exceeds remaining body", field, count),
            ));
        }
        Ok(count)
    }

    /// Fail if any bytes are left unread
    pub fn finish(self) -> WireResult<()> {
        if self.remaining() != 0 {
            return Err(WireError::malformed(
                self.kind,
                format!("{} trailing bytes", self.remaining()),
            ));
        }
        Ok(())
    }
}
