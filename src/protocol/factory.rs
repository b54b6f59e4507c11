//! Message boundary detection and dispatch
//!
//! A [`MessageFactory`] is bound to one protocol version. It previews the
//! buffered stream to decide whether a whole frame is available, then maps
//! the command tag to a [`MessageKind`] and wraps the frame.
//!
//! ```text
//! NEED_HEADER --header buffered--> HAVE_HEADER(tag, len)
//!             --payload buffered--> HAVE_FULL_MESSAGE --consume--> NEED_HEADER
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace};

use super::{
    codec, validate_payload, Command, CommonHeader, Framing, Message, MessageKind,
    StreamAccumulator, Validation, WireError, WireMessage, WireResult, DEFAULT_MAX_MESSAGE_SIZE,
};
use crate::messages::BroadcastPrefix;

/// Result of looking at the head of a stream without consuming it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preview {
    /// Header not fully buffered
    NotReady,
    /// Header buffered, payload still arriving
    Incomplete { command: Command, payload_len: u32 },
    /// A whole frame is buffered
    Ready { command: Command, payload_len: u32 },
}

impl Preview {
    pub fn is_ready(&self) -> bool {
        matches!(self, Preview::Ready { .. })
    }
}

/// Broadcast prefix read from the head of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastPreview {
    pub kind: MessageKind,
    pub payload_len: u32,
    pub prefix: BroadcastPrefix,
    /// Whether the whole frame is already buffered
    pub is_complete: bool,
}

/// Per-version message factory
#[derive(Debug)]
pub struct MessageFactory {
    version: u32,
    framing: Framing,
    commands: HashMap<Command, MessageKind>,
    max_message_size: usize,
}

impl MessageFactory {
    /// Build the factory for `version`, registering every kind it knows
    pub fn new(version: u32, max_message_size: usize) -> Self {
        let commands: HashMap<_, _> = MessageKind::ALL
            .into_iter()
            .filter(|kind| kind.is_available_in(version))
            .map(|kind| (kind.command(), kind))
            .collect();

        debug!(
            "Built message factory for v{} with {} kinds",
            version,
            commands.len()
        );

        Self {
            version,
            framing: Framing::for_version(version),
            commands,
            max_message_size,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn header_len(&self) -> usize {
        self.framing.header_len()
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    pub fn supports(&self, kind: MessageKind) -> bool {
        self.commands.values().any(|k| *k == kind)
    }

    /// Kinds registered with this factory, in catalogue order
    pub fn kinds(&self) -> Vec<MessageKind> {
        let mut kinds: Vec<_> = self.commands.values().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn lookup(&self, command: &Command) -> WireResult<MessageKind> {
        self.commands
            .get(command)
            .copied()
            .ok_or_else(|| WireError::UnrecognizedCommand {
                command: command.as_str(),
                version: self.version,
            })
    }

    /// Check whether a whole frame is buffered. Never consumes.
    pub fn preview(&self, stream: &mut StreamAccumulator) -> WireResult<Preview> {
        let header_len = self.header_len();
        if stream.len() < header_len {
            return Ok(Preview::NotReady);
        }

        let header = CommonHeader::unpack(stream.peek(header_len)?, self.framing)?;
        let payload_len = header.payload_len as usize;
        if payload_len > self.max_message_size {
            return Err(Validation::PayloadTooLarge {
                size: payload_len,
                max: self.max_message_size,
            }
            .into());
        }

        if stream.len() >= header.message_len(self.framing) {
            Ok(Preview::Ready {
                command: header.command,
                payload_len: header.payload_len,
            })
        } else {
            Ok(Preview::Incomplete {
                command: header.command,
                payload_len: header.payload_len,
            })
        }
    }

    /// Read the broadcast prefix of the frame at the head of the stream.
    ///
    /// Returns `None` until the header and the prefix are buffered.
    pub fn preview_broadcast(
        &self,
        stream: &mut StreamAccumulator,
    ) -> WireResult<Option<BroadcastPreview>> {
        let (command, payload_len) = match self.preview(stream)? {
            Preview::NotReady => return Ok(None),
            Preview::Incomplete {
                command,
                payload_len,
            }
            | Preview::Ready {
                command,
                payload_len,
            } => (command, payload_len),
        };

        let kind = self.lookup(&command)?;
        if !kind.is_broadcast() {
            return Err(WireError::TypeMismatch {
                expected: "broadcast message".to_string(),
                actual: kind.to_string(),
            });
        }

        let header_len = self.header_len();
        let prefix_end = header_len + BroadcastPrefix::wire_len(self.version);
        if stream.len() < prefix_end {
            return Ok(None);
        }

        let prefix = BroadcastPrefix::parse(stream.slice(header_len, prefix_end)?, self.version)?;
        let is_complete = stream.len() >= header_len + payload_len as usize;

        Ok(Some(BroadcastPreview {
            kind,
            payload_len,
            prefix,
            is_complete,
        }))
    }

    /// Wrap one complete frame
    pub fn create_from_buffer(&self, buf: Bytes) -> WireResult<WireMessage> {
        let header = CommonHeader::unpack(&buf, self.framing)?;
        validate_payload(&buf, &header, self.framing)?;
        let kind = self.lookup(&header.command)?;

        let payload_len = header.payload_len as usize;
        if payload_len > self.max_message_size {
            return Err(Validation::PayloadTooLarge {
                size: payload_len,
                max: self.max_message_size,
            }
            .into());
        }

        let wire = WireMessage::from_parts(buf, self.version, kind, header);
        if let Some(flags) = wire.control_flags() {
            flags.validate()?;
        }

        trace!("Parsed {} ({} bytes) under v{}", kind, wire.len(), self.version);
        Ok(wire)
    }

    /// Consume and wrap the next frame if one is fully buffered.
    ///
    /// A frame that fails to parse is still consumed so the stream stays
    /// aligned on the next header.
    pub fn try_extract(&self, stream: &mut StreamAccumulator) -> WireResult<Option<WireMessage>> {
        match self.preview(stream)? {
            Preview::Ready { payload_len, .. } => {
                let buf = stream.consume(self.header_len() + payload_len as usize)?;
                self.create_from_buffer(buf).map(Some)
            }
            Preview::NotReady | Preview::Incomplete { .. } => Ok(None),
        }
    }

    /// Encode a message under this factory's version
    pub fn encode(&self, message: &Message) -> WireResult<WireMessage> {
        codec::encode(message, self.version)
    }
}

/// Byte stream of one connection paired with the factory for its version
#[derive(Debug)]
pub struct MessageStream {
    buffer: StreamAccumulator,
    factory: Arc<MessageFactory>,
}

impl MessageStream {
    pub fn new(factory: Arc<MessageFactory>) -> Self {
        Self {
            buffer: StreamAccumulator::new(),
            factory,
        }
    }

    /// Stream for a peer whose version is not known yet, parsed with the
    /// default limits of `version` until [`switch_factory`](Self::switch_factory)
    pub fn for_version(version: u32) -> Self {
        Self::new(Arc::new(MessageFactory::new(version, DEFAULT_MAX_MESSAGE_SIZE)))
    }

    pub fn feed(&mut self, chunk: impl Into<Bytes>) {
        self.buffer.add(chunk);
    }

    /// Next complete message, or `None` while more bytes are needed
    pub fn try_extract_message(&mut self) -> WireResult<Option<WireMessage>> {
        self.factory.try_extract(&mut self.buffer)
    }

    pub fn preview(&mut self) -> WireResult<Preview> {
        self.factory.preview(&mut self.buffer)
    }

    pub fn preview_broadcast(&mut self) -> WireResult<Option<BroadcastPreview>> {
        self.factory.preview_broadcast(&mut self.buffer)
    }

    /// Version of a hello at the head of the stream, readable before the
    /// peer's factory is chosen
    pub fn negotiate_version(&mut self) -> Option<u32> {
        let wanted = self.buffer.len().min(super::HELLO_VERSION_WINDOW);
        let bytes = self.buffer.peek(wanted).ok()?;
        super::negotiate_version(bytes)
    }

    pub fn switch_factory(&mut self, factory: Arc<MessageFactory>) {
        debug!(
            "Switching stream from v{} to v{}",
            self.factory.version(),
            factory.version()
        );
        self.factory = factory;
    }

    pub fn factory(&self) -> &Arc<MessageFactory> {
        &self.factory
    }

    /// Bytes buffered but not yet extracted
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{PingMessage, Sha256Hash, TxMessage};
    use uuid::Uuid;

    fn factory(version: u32) -> MessageFactory {
        MessageFactory::new(version, DEFAULT_MAX_MESSAGE_SIZE)
    }

    fn tx(version: u32) -> WireMessage {
        let tx = TxMessage {
            message_hash: Sha256Hash::new([2u8; 32]),
            network_num: 5,
            source_id: Uuid::from_bytes([4u8; 16]),
            tx_val: Bytes::from(vec![9u8; 100]),
            ..Default::default()
        };
        codec::encode(&Message::Tx(tx), version).unwrap()
    }

    #[test]
    fn test_registry_scoped_to_version() {
        assert!(!factory(8).supports(MessageKind::Notification));
        assert!(factory(9).supports(MessageKind::Notification));
        assert_eq!(factory(22).kinds().len(), MessageKind::ALL.len());
    }

    #[test]
    fn test_preview_states() {
        let f = factory(22);
        let wire = tx(22);
        let mut stream = StreamAccumulator::new();

        stream.add(Bytes::copy_from_slice(&wire.as_bytes()[..10]));
        assert_eq!(f.preview(&mut stream).unwrap(), Preview::NotReady);

        stream.add(Bytes::copy_from_slice(&wire.as_bytes()[10..40]));
        assert_eq!(
            f.preview(&mut stream).unwrap(),
            Preview::Incomplete {
                command: MessageKind::Tx.command(),
                payload_len: wire.payload_len()
            }
        );

        stream.add(Bytes::copy_from_slice(&wire.as_bytes()[40..]));
        assert!(f.preview(&mut stream).unwrap().is_ready());
        assert_eq!(stream.len(), wire.len());
    }

    #[test]
    fn test_preview_rejects_oversized_payload() {
        let f = MessageFactory::new(22, 64);
        let mut stream = StreamAccumulator::new();
        stream.add(tx(22).into_bytes());

        assert!(matches!(
            f.preview(&mut stream),
            Err(WireError::Validation(Validation::PayloadTooLarge { max: 64, .. }))
        ));
    }

    #[test]
    fn test_preview_broadcast_needs_only_prefix() {
        let f = factory(22);
        let wire = tx(22);
        let mut stream = StreamAccumulator::new();

        stream.add(Bytes::copy_from_slice(&wire.as_bytes()[..60]));
        assert_eq!(f.preview_broadcast(&mut stream).unwrap(), None);

        stream.add(Bytes::copy_from_slice(&wire.as_bytes()[60..80]));
        let preview = f.preview_broadcast(&mut stream).unwrap().unwrap();
        assert_eq!(preview.kind, MessageKind::Tx);
        assert_eq!(preview.prefix.network_num, Some(5));
        assert_eq!(preview.prefix.source_id, Some(Uuid::from_bytes([4u8; 16])));
        assert!(!preview.is_complete);
    }

    #[test]
    fn test_preview_broadcast_on_control_message() {
        let f = factory(22);
        let mut stream = StreamAccumulator::new();
        stream.add(codec::encode(&Message::Ping(PingMessage { nonce: 1 }), 22).unwrap().into_bytes());
        assert!(matches!(
            f.preview_broadcast(&mut stream),
            Err(WireError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_create_rejects_invalid_control_flag() {
        let wire = tx(22);
        let mut bytes = wire.as_bytes().to_vec();
        let last = bytes.len() - 1;
        bytes[last] = 0x00;

        assert_eq!(
            factory(22).create_from_buffer(Bytes::from(bytes)).unwrap_err(),
            WireError::Validation(Validation::InvalidControlFlag(0))
        );
    }

    #[test]
    fn test_create_rejects_kind_from_newer_version() {
        let wire = codec::encode(
            &Message::Notification(crate::messages::NotificationMessage::default()),
            9,
        )
        .unwrap();
        assert!(matches!(
            factory(8).create_from_buffer(wire.into_bytes()),
            Err(WireError::UnrecognizedCommand { version: 8, .. })
        ));
    }

    #[test]
    fn test_try_extract_back_to_back() {
        let f = factory(22);
        let first = tx(22);
        let second = codec::encode(&Message::Ack, 22).unwrap();

        let mut joined = first.as_bytes().to_vec();
        joined.extend_from_slice(second.as_bytes());
        let mut stream = StreamAccumulator::new();
        stream.add(joined);

        assert_eq!(f.try_extract(&mut stream).unwrap().unwrap(), first);
        assert_eq!(f.try_extract(&mut stream).unwrap().unwrap(), second);
        assert_eq!(f.try_extract(&mut stream).unwrap(), None);
        assert!(stream.is_empty());
    }

    #[test]
    fn test_message_stream_switch_factory() {
        let mut stream = MessageStream::for_version(22);
        stream.feed(codec::encode(&Message::Ack, 7).unwrap().into_bytes());
        stream.switch_factory(Arc::new(factory(7)));

        let wire = stream.try_extract_message().unwrap().unwrap();
        assert_eq!(wire.version(), 7);
        assert_eq!(stream.buffered(), 0);
    }
}
