//! Keepalive messages
//!
//! Nonces were added in v6 and pong timestamps in v13. Older pings are empty,
//! which makes a legacy ping exactly its header.

use bytes::{BufMut, Bytes, BytesMut};

use super::WireBody;
use crate::protocol::{BodyReader, WireResult};

/// First version whose ping/pong carries a nonce
pub const NONCE_VERSION: u32 = 6;

/// First version whose pong carries the responder's timestamp
pub const PONG_TIMESTAMP_VERSION: u32 = 13;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PingMessage {
    pub nonce: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PongMessage {
    pub nonce: u64,
    /// Responder wall clock in milliseconds
    pub timestamp: u64,
}

impl WireBody for PingMessage {
    const NAME: &'static str = "ping";

    fn body_len(&self, version: u32) -> usize {
        if version >= NONCE_VERSION { 8 } else { 0 }
    }

    fn encode_body(&self, version: u32, out: &mut BytesMut) -> WireResult<()> {
        if version >= NONCE_VERSION {
            out.put_u64_le(self.nonce);
        }
        Ok(())
    }

    fn decode_body(body: &Bytes, version: u32) -> WireResult<Self> {
        let mut reader = BodyReader::over(Self::NAME, body);
        let nonce = if version >= NONCE_VERSION {
            reader.u64_le("nonce")?
        } else {
            0
        };
        reader.finish()?;
        Ok(Self { nonce })
    }
}

impl WireBody for PongMessage {
    const NAME: &'static str = "pong";

    fn body_len(&self, version: u32) -> usize {
        let mut len = 0;
        if version >= NONCE_VERSION {
            len += 8;
        }
        if version >= PONG_TIMESTAMP_VERSION {
            len += 8;
        }
        len
    }

    fn encode_body(&self, version: u32, out: &mut BytesMut) -> WireResult<()> {
        if version >= NONCE_VERSION {
            out.put_u64_le(self.nonce);
        }
        if version >= PONG_TIMESTAMP_VERSION {
            out.put_u64_le(self.timestamp);
        }
        Ok(())
    }

    fn decode_body(body: &Bytes, version: u32) -> WireResult<Self> {
        let mut reader = BodyReader::over(Self::NAME, body);
        let nonce = if version >= NONCE_VERSION {
            reader.u64_le("nonce")?
        } else {
            0
        };
        let timestamp = if version >= PONG_TIMESTAMP_VERSION {
            reader.u64_le("timestamp")?
        } else {
            0
        };
        reader.finish()?;
        Ok(Self { nonce, timestamp })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_layouts() {
        let ping = PingMessage { nonce: 0xDEAD_BEEF };
        assert_eq!(ping.body_len(5), 0);
        assert_eq!(ping.body_len(6), 8);

        let mut out = BytesMut::new();
        ping.encode_body(22, &mut out).unwrap();
        assert_eq!(PingMessage::decode_body(&out.freeze(), 22).unwrap(), ping);

        assert_eq!(PingMessage::decode_body(&Bytes::new(), 3).unwrap().nonce, 0);
    }

    #[test]
    fn test_pong_timestamp_added_in_v13() {
        let pong = PongMessage {
            nonce: 9,
            timestamp: 1_700_000_000_000,
        };
        assert_eq!(pong.body_len(12), 8);
        assert_eq!(pong.body_len(13), 16);

        let mut out = BytesMut::new();
        pong.encode_body(12, &mut out).unwrap();
        let decoded = PongMessage::decode_body(&out.freeze(), 12).unwrap();
        assert_eq!(decoded.nonce, 9);
        assert_eq!(decoded.timestamp, 0);
    }

    #[test]
    fn test_ping_rejects_extra_bytes() {
        let body = Bytes::from_static(&[0u8; 9]);
        assert!(PingMessage::decode_body(&body, 22).is_err());
    }
}
