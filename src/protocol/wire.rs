//! Framed message over an owned buffer
//!
//! A [`WireMessage`] keeps the exact bytes it was parsed from or encoded
//! into. Header fields are read once at construction; the broadcast prefix
//! and the full canonical message are decoded on first access and cached.

use std::fmt;
use std::sync::OnceLock;

use bytes::{Bytes, BytesMut};
use uuid::Uuid;

use super::{
    Command, CommonHeader, ControlFlags, Framing, Message, MessageKind, WireError, WireResult,
};
use crate::messages::{BroadcastPrefix, Sha256Hash, SOURCE_ID_VERSION};

/// One complete message frame
#[derive(Clone)]
pub struct WireMessage {
    buf: Bytes,
    version: u32,
    kind: MessageKind,
    header: CommonHeader,
    /// Send priority, never serialized
    priority: bool,
    broadcast: OnceLock<BroadcastPrefix>,
    decoded: OnceLock<Message>,
}

impl WireMessage {
    /// Wrap an already validated frame. Nothing past the header is decoded.
    pub(crate) fn from_parts(
        buf: Bytes,
        version: u32,
        kind: MessageKind,
        header: CommonHeader,
    ) -> Self {
        Self {
            buf,
            version,
            kind,
            header,
            priority: false,
            broadcast: OnceLock::new(),
            decoded: OnceLock::new(),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn framing(&self) -> Framing {
        Framing::for_version(self.version)
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn command(&self) -> Command {
        self.header.command
    }

    /// Declared payload length, control flag included
    pub fn payload_len(&self) -> u32 {
        self.header.payload_len
    }

    /// Full frame length
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn header_len(&self) -> usize {
        self.framing().header_len()
    }

    /// Everything after the header, control flag included
    pub fn payload(&self) -> &[u8] {
        &self.buf[self.header_len()..]
    }

    /// Payload without the control flag
    pub fn body(&self) -> &[u8] {
        &self.buf[self.header_len()..self.body_end()]
    }

    /// Owned view of the body sharing this message's buffer
    pub fn body_bytes(&self) -> Bytes {
        self.buf.slice(self.header_len()..self.body_end())
    }

    /// Trailing control flag, `None` under the legacy framing
    pub fn control_flags(&self) -> Option<ControlFlags> {
        match self.framing() {
            Framing::Legacy => None,
            Framing::Sequenced => self.buf.last().map(|&b| ControlFlags::from_bits(b)),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf
    }

    pub fn priority(&self) -> bool {
        self.priority
    }

    pub fn set_priority(&mut self, priority: bool) {
        self.priority = priority;
    }

    /// Content hash of a broadcast-family message
    pub fn message_hash(&self) -> WireResult<Sha256Hash> {
        Ok(self.broadcast_prefix()?.message_hash)
    }

    /// Network number, `None` for versions that predate it
    pub fn network_num(&self) -> WireResult<Option<u32>> {
        Ok(self.broadcast_prefix()?.network_num)
    }

    /// Source peer id, `None` for versions that predate it
    pub fn source_id(&self) -> WireResult<Option<Uuid>> {
        Ok(self.broadcast_prefix()?.source_id)
    }

    /// Decoded broadcast prefix, cached after the first call
    pub fn broadcast_prefix(&self) -> WireResult<&BroadcastPrefix> {
        if !self.kind.is_broadcast() {
            return Err(WireError::TypeMismatch {
                expected: "broadcast message".to_string(),
                actual: self.kind.to_string(),
            });
        }
        if let Some(prefix) = self.broadcast.get() {
            return Ok(prefix);
        }
        let prefix = BroadcastPrefix::parse(self.body(), self.version)?;
        Ok(self.broadcast.get_or_init(|| prefix))
    }

    /// Canonical message, decoded on first call and cached
    pub fn decode(&self) -> WireResult<&Message> {
        if let Some(message) = self.decoded.get() {
            return Ok(message);
        }
        let message = Message::decode_body(self.kind, &self.body_bytes(), self.version)?;
        Ok(self.decoded.get_or_init(|| message))
    }

    /// Rewrite the source peer id in place. Cached derived values are dropped.
    pub fn set_source_id(&mut self, source_id: Uuid) -> WireResult<()> {
        if !self.kind.is_broadcast() {
            return Err(WireError::TypeMismatch {
                expected: "broadcast message".to_string(),
                actual: self.kind.to_string(),
            });
        }
        let offset = BroadcastPrefix::source_id_offset(self.version).ok_or(
            WireError::UnsupportedConversion {
                kind: self.kind,
                from: self.version,
                to: SOURCE_ID_VERSION,
                reason: "version carries no source id",
            },
        )?;

        let start = self.header_len() + offset;
        let end = start + source_id.as_bytes().len();
        if end > self.body_end() {
            return Err(WireError::malformed(self.kind.name(), "body shorter than prefix"));
        }

        let mut buf = BytesMut::from(&self.buf[..]);
        buf[start..end].copy_from_slice(source_id.as_bytes());
        self.buf = buf.freeze();
        self.broadcast = OnceLock::new();
        self.decoded = OnceLock::new();
        Ok(())
    }

    fn body_end(&self) -> usize {
        self.buf.len() - self.framing().control_flag_len()
    }
}

impl PartialEq for WireMessage {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version && self.buf == other.buf
    }
}

impl Eq for WireMessage {}

impl fmt::Debug for WireMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireMessage")
            .field("kind", &self.kind)
            .field("version", &self.version)
            .field("payload_len", &self.header.payload_len)
            .field("priority", &self.priority)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{HelloMessage, PingMessage, TransactionFlag, TxMessage};
    use crate::protocol::{encode, MessageFactory, DEFAULT_MAX_MESSAGE_SIZE};

    fn tx_wire(version: u32) -> WireMessage {
        let tx = TxMessage {
            message_hash: Sha256Hash::new([7u8; 32]),
            network_num: 5,
            source_id: Uuid::from_bytes([1u8; 16]),
            short_id: 3,
            tx_val: Bytes::from_static(b"body"),
            ..Default::default()
        };
        encode(&Message::Tx(tx), version).unwrap()
    }

    #[test]
    fn test_length_accounting() {
        let wire = tx_wire(22);
        assert_eq!(wire.payload_len() as usize, wire.len() - wire.header_len());
        assert_eq!(wire.body().len(), wire.payload().len() - 1);
        assert_eq!(wire.control_flags(), Some(ControlFlags::VALID));

        let legacy = tx_wire(3);
        assert_eq!(legacy.payload_len() as usize, legacy.len() - 16);
        assert_eq!(legacy.body(), legacy.payload());
        assert_eq!(legacy.control_flags(), None);
    }

    #[test]
    fn test_broadcast_accessors() {
        let wire = tx_wire(22);
        assert_eq!(wire.message_hash().unwrap(), Sha256Hash::new([7u8; 32]));
        assert_eq!(wire.network_num().unwrap(), Some(5));
        assert_eq!(wire.source_id().unwrap(), Some(Uuid::from_bytes([1u8; 16])));

        let legacy = tx_wire(3);
        assert_eq!(legacy.network_num().unwrap(), None);
        assert_eq!(legacy.source_id().unwrap(), None);
    }

    #[test]
    fn test_broadcast_accessors_on_control_message() {
        let wire = encode(&Message::Ping(PingMessage { nonce: 1 }), 22).unwrap();
        assert!(matches!(
            wire.message_hash(),
            Err(WireError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_body_bytes_share_buffer() {
        let wire = tx_wire(22);
        let body = wire.body_bytes();
        assert_eq!(body.as_ptr(), wire.body().as_ptr());
    }

    #[test]
    fn test_set_source_id_rewrites_bytes() {
        let mut wire = tx_wire(22);
        let original_len = wire.len();
        // Populate caches first
        wire.source_id().unwrap();
        wire.decode().unwrap();

        let new_source = Uuid::from_bytes([0xAB; 16]);
        wire.set_source_id(new_source).unwrap();

        assert_eq!(wire.len(), original_len);
        assert_eq!(wire.source_id().unwrap(), Some(new_source));
        match wire.decode().unwrap() {
            Message::Tx(tx) => {
                assert_eq!(tx.source_id, new_source);
                assert_eq!(tx.tx_val, Bytes::from_static(b"body"));
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_set_source_id_needs_v7() {
        let mut wire = tx_wire(6);
        assert!(matches!(
            wire.set_source_id(Uuid::nil()),
            Err(WireError::UnsupportedConversion { .. })
        ));
    }

    #[test]
    fn test_decode_reflects_version_fields() {
        let tx = TxMessage {
            transaction_flag: TransactionFlag {
                paid: true,
                status_track: true,
                nonce_track: false,
            },
            timestamp: 77,
            ..Default::default()
        };
        let wire = encode(&Message::Tx(tx), 11).unwrap();
        let factory = MessageFactory::new(11, DEFAULT_MAX_MESSAGE_SIZE);
        let parsed = factory.create_from_buffer(wire.as_bytes().to_vec().into()).unwrap();

        assert_eq!(wire.decode().unwrap(), parsed.decode().unwrap());
        match wire.decode().unwrap() {
            Message::Tx(tx) => {
                assert_eq!(tx.transaction_flag, TransactionFlag::paid());
                assert_eq!(tx.timestamp, 0);
            }
            other => panic!("unexpected message {:?}", other),
        }

        let hello = HelloMessage::new(3, 5, Uuid::from_bytes([9u8; 16]));
        let legacy = encode(&Message::Hello(hello), 3).unwrap();
        match legacy.decode().unwrap() {
            Message::Hello(hello) => assert!(hello.node_id.is_nil()),
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_priority_is_not_serialized() {
        let mut wire = tx_wire(22);
        let bytes = wire.as_bytes().to_vec();
        wire.set_priority(true);
        assert!(wire.priority());
        assert_eq!(wire.as_bytes(), &bytes[..]);
    }
}
