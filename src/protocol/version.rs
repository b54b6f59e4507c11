//! Protocol version registry and negotiation
//!
//! The registry is built once at startup and shared read-only between
//! connections. It holds a [`MessageFactory`] for every supported version
//! and a [`ConverterSet`] for every supported version older than the local
//! one.
//!
//! Converters only bridge the local version and one older version. A
//! conversion between two older versions takes two hops through the local
//! version.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::{
    CommonHeader, Framing, MessageFactory, MessageKind, MessageStream, Validation, WireError,
    WireMessage, WireResult, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_MIN_SUPPORTED_VERSION,
    MIN_KNOWN_VERSION, PROTOCOL_VERSION,
};
use crate::converter::{ConversionDefaults, ConverterSet};

/// Bytes needed to read the version field of a hello under any framing
pub const HELLO_VERSION_WINDOW: usize = Framing::Sequenced.header_len() + 4;

/// Read-only protocol parameters injected at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolSettings {
    pub local_version: u32,
    pub min_supported_version: u32,
    pub max_message_size: usize,
    /// Network number given to messages converted from versions without one
    pub default_network_num: Option<u32>,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            local_version: PROTOCOL_VERSION,
            min_supported_version: DEFAULT_MIN_SUPPORTED_VERSION,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            default_network_num: None,
        }
    }
}

impl ProtocolSettings {
    /// Reject a version window outside the known catalogue
    pub fn validate(&self) -> WireResult<()> {
        if self.local_version > PROTOCOL_VERSION || self.local_version < MIN_KNOWN_VERSION {
            return Err(WireError::UnsupportedVersion(self.local_version));
        }
        if self.min_supported_version < MIN_KNOWN_VERSION
            || self.min_supported_version > self.local_version
        {
            return Err(WireError::UnsupportedVersion(self.min_supported_version));
        }
        if self.max_message_size == 0 {
            return Err(Validation::InvalidSetting("max_message_size").into());
        }
        Ok(())
    }

    pub fn defaults(&self) -> ConversionDefaults {
        ConversionDefaults {
            network_num: self.default_network_num,
        }
    }
}

/// Factories and converters for every supported version
#[derive(Debug)]
pub struct VersionRegistry {
    settings: ProtocolSettings,
    factories: BTreeMap<u32, Arc<MessageFactory>>,
    converters: BTreeMap<u32, Arc<ConverterSet>>,
}

impl VersionRegistry {
    pub fn new(settings: ProtocolSettings) -> WireResult<Self> {
        settings.validate()?;

        let local = settings.local_version;
        let mut factories = BTreeMap::new();
        let mut converters = BTreeMap::new();

        for version in settings.min_supported_version..=local {
            factories.insert(
                version,
                Arc::new(MessageFactory::new(version, settings.max_message_size)),
            );
            if version < local {
                converters.insert(
                    version,
                    Arc::new(ConverterSet::new(version, local, settings.defaults())),
                );
            }
        }

        info!(
            "Protocol registry ready: local v{}, supporting v{}-v{}",
            local, settings.min_supported_version, local
        );

        Ok(Self {
            settings,
            factories,
            converters,
        })
    }

    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    pub fn local_version(&self) -> u32 {
        self.settings.local_version
    }

    /// Supported versions, oldest first
    pub fn versions(&self) -> impl Iterator<Item = u32> + '_ {
        self.factories.keys().copied()
    }

    pub fn is_supported(&self, version: u32) -> bool {
        self.factories.contains_key(&version)
    }

    /// Factory for `version` and, for older versions, the converters to and
    /// from the local version
    pub fn get_factory(
        &self,
        version: u32,
    ) -> WireResult<(Arc<MessageFactory>, Option<Arc<ConverterSet>>)> {
        let factory = self.factory(version)?;
        Ok((factory, self.converters.get(&version).cloned()))
    }

    pub fn factory(&self, version: u32) -> WireResult<Arc<MessageFactory>> {
        self.factories
            .get(&version)
            .cloned()
            .ok_or(WireError::UnsupportedVersion(version))
    }

    pub fn converter_set(&self, version: u32) -> Option<&Arc<ConverterSet>> {
        self.converters.get(&version)
    }

    /// Session version for the hello at the head of `stream`:
    /// the lower of the local and peer versions
    pub fn negotiate(&self, stream: &mut MessageStream) -> Option<u32> {
        let peer = stream.negotiate_version()?;
        let session = peer.min(self.local_version());
        if self.is_supported(session) {
            debug!("Negotiated v{} with peer declaring v{}", session, peer);
        } else {
            warn!("Peer declared unsupported protocol v{}", peer);
        }
        Some(session)
    }

    /// Convert a whole message from version `from` to version `to`
    pub fn convert(&self, msg: &WireMessage, from: u32, to: u32) -> WireResult<WireMessage> {
        let result = self.convert_message(msg, from, to);
        if let Err(ref e) = result {
            warn!("Failed to convert {} from v{} to v{}: {}", msg.kind(), from, to, e);
        }
        result
    }

    fn convert_message(&self, msg: &WireMessage, from: u32, to: u32) -> WireResult<WireMessage> {
        if msg.version() != from {
            return Err(WireError::TypeMismatch {
                expected: format!("v{} message", from),
                actual: format!("v{} message", msg.version()),
            });
        }
        self.check_pair(from, to)?;
        if from == to {
            return Ok(msg.clone());
        }

        let local = self.local_version();
        let current = if from == local {
            msg.clone()
        } else {
            self.set(from)?.converter(msg.kind())?.convert_from_older(msg)?
        };

        if to == local {
            Ok(current)
        } else {
            self.set(to)?.converter(msg.kind())?.convert_to_older(&current)
        }
    }

    /// Transcode the first bytes of a frame being relayed: the header and
    /// the fixed region of the body
    pub fn convert_first_bytes(
        &self,
        kind: MessageKind,
        prefix: &[u8],
        from: u32,
        to: u32,
    ) -> WireResult<Bytes> {
        self.check_pair(from, to)?;
        if from == to {
            return Ok(Bytes::copy_from_slice(prefix));
        }

        let local = self.local_version();
        let current = if from == local {
            Bytes::copy_from_slice(prefix)
        } else {
            self.set(from)?
                .converter(kind)?
                .convert_first_bytes_from_older(prefix)?
        };

        if to == local {
            Ok(current)
        } else {
            self.set(to)?.converter(kind)?.convert_first_bytes_to_older(&current)
        }
    }

    /// Transcode the last bytes of a frame being relayed (its control flag)
    pub fn convert_last_bytes(
        &self,
        kind: MessageKind,
        suffix: &[u8],
        from: u32,
        to: u32,
    ) -> WireResult<Bytes> {
        self.check_pair(from, to)?;
        if from == to {
            return Ok(Bytes::copy_from_slice(suffix));
        }

        let local = self.local_version();
        let current = if from == local {
            Bytes::copy_from_slice(suffix)
        } else {
            self.set(from)?
                .converter(kind)?
                .convert_last_bytes_from_older(suffix)?
        };

        if to == local {
            Ok(current)
        } else {
            self.set(to)?.converter(kind)?.convert_last_bytes_to_older(&current)
        }
    }

    /// Length of the first-bytes region of a `kind` frame under `version`
    pub fn first_bytes_len(&self, kind: MessageKind, version: u32) -> WireResult<usize> {
        let layout = kind
            .partial_layout(version)
            .ok_or(WireError::UnsupportedConversion {
                kind,
                from: version,
                to: version,
                reason: "kind has no fixed region",
            })?;
        Ok(Framing::for_version(version).header_len() + layout.fixed_len)
    }

    /// Length of the last-bytes region under `version`
    pub fn last_bytes_len(&self, version: u32) -> usize {
        Framing::for_version(version).control_flag_len()
    }

    /// Constant frame length change of a `kind` conversion from `from` to `to`
    pub fn size_delta(&self, kind: MessageKind, from: u32, to: u32) -> WireResult<isize> {
        self.check_pair(from, to)?;
        if from == to {
            return Ok(0);
        }

        let local = self.local_version();
        let up = if from == local {
            0
        } else {
            self.set(from)?.converter(kind)?.size_delta_from_older()?
        };
        let down = if to == local {
            0
        } else {
            self.set(to)?.converter(kind)?.size_delta_to_older()?
        };
        Ok(up + down)
    }

    fn check_pair(&self, from: u32, to: u32) -> WireResult<()> {
        for version in [from, to] {
            if !self.is_supported(version) {
                return Err(WireError::UnsupportedVersion(version));
            }
        }
        Ok(())
    }

    fn set(&self, version: u32) -> WireResult<&ConverterSet> {
        self.converters
            .get(&version)
            .map(Arc::as_ref)
            .ok_or(WireError::UnsupportedVersion(version))
    }
}

/// Declared protocol version of a hello at the start of `bytes`.
///
/// Works without a version-specific factory: the framing is detected from the
/// starting sequence, and the version is the first body field in every
/// version. Returns `None` when too few bytes are buffered or the first frame
/// is not a hello.
pub fn negotiate_version(bytes: &[u8]) -> Option<u32> {
    let framing = Framing::detect(bytes)?;
    let header = CommonHeader::unpack(bytes, framing).ok()?;
    if header.command != MessageKind::Hello.command() {
        return None;
    }

    let offset = framing.header_len();
    let field = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([field[0], field[1], field[2], field[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{HelloMessage, PingMessage};
    use crate::protocol::{encode, Message};
    use uuid::Uuid;

    fn registry() -> VersionRegistry {
        VersionRegistry::new(ProtocolSettings {
            default_network_num: Some(5),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_settings_validation() {
        assert!(ProtocolSettings::default().validate().is_ok());

        let too_new = ProtocolSettings {
            local_version: PROTOCOL_VERSION + 1,
            ..Default::default()
        };
        assert_eq!(
            too_new.validate().unwrap_err(),
            WireError::UnsupportedVersion(PROTOCOL_VERSION + 1)
        );

        let inverted = ProtocolSettings {
            local_version: 10,
            min_supported_version: 12,
            ..Default::default()
        };
        assert!(inverted.validate().is_err());

        let no_room = ProtocolSettings {
            max_message_size: 0,
            ..Default::default()
        };
        assert_eq!(
            no_room.validate().unwrap_err(),
            WireError::Validation(Validation::InvalidSetting("max_message_size"))
        );
    }

    #[test]
    fn test_supported_window() {
        let registry = registry();
        assert!(registry.is_supported(6));
        assert!(registry.is_supported(22));
        assert!(!registry.is_supported(5));
        assert!(!registry.is_supported(23));
        assert_eq!(registry.versions().count(), 17);
    }

    #[test]
    fn test_get_factory() {
        let registry = registry();

        let (factory, converters) = registry.get_factory(22).unwrap();
        assert_eq!(factory.version(), 22);
        assert!(converters.is_none());

        let (factory, converters) = registry.get_factory(15).unwrap();
        assert_eq!(factory.version(), 15);
        assert_eq!(converters.unwrap().older_version(), 15);

        assert_eq!(
            registry.get_factory(3).unwrap_err(),
            WireError::UnsupportedVersion(3)
        );
    }

    #[test]
    fn test_negotiate_version_without_factory() {
        let hello = Message::Hello(HelloMessage::new(4, 1, Uuid::nil()));
        let wire = encode(&hello, 4).unwrap();
        assert_eq!(negotiate_version(wire.as_bytes()), Some(4));

        let legacy = encode(&Message::Hello(HelloMessage::new(3, 1, Uuid::nil())), 3).unwrap();
        assert_eq!(negotiate_version(legacy.as_bytes()), Some(3));

        assert_eq!(negotiate_version(&wire.as_bytes()[..22]), None);

        let ping = encode(&Message::Ping(PingMessage { nonce: 1 }), 22).unwrap();
        assert_eq!(negotiate_version(ping.as_bytes()), None);
    }

    #[test]
    fn test_negotiate_picks_lower_version() {
        let registry = registry();

        let mut stream = MessageStream::for_version(22);
        let hello = Message::Hello(HelloMessage::new(15, 1, Uuid::nil()));
        stream.feed(encode(&hello, 15).unwrap().into_bytes());
        assert_eq!(registry.negotiate(&mut stream), Some(15));
        // Negotiation does not consume the hello
        assert!(stream.buffered() > 0);

        let mut newer = MessageStream::for_version(22);
        let hello = Message::Hello(HelloMessage::new(30, 1, Uuid::nil()));
        newer.feed(encode(&hello, 22).unwrap().into_bytes());
        assert_eq!(registry.negotiate(&mut newer), Some(22));
    }

    #[test]
    fn test_convert_checks_declared_version() {
        let registry = registry();
        let wire = encode(&Message::Ping(PingMessage { nonce: 1 }), 22).unwrap();

        assert!(matches!(
            registry.convert(&wire, 20, 15),
            Err(WireError::TypeMismatch { .. })
        ));
        assert_eq!(
            registry.convert(&wire, 22, 5).unwrap_err(),
            WireError::UnsupportedVersion(5)
        );
        assert_eq!(registry.convert(&wire, 22, 22).unwrap(), wire);
    }

    #[test]
    fn test_convert_between_older_versions() {
        let registry = registry();
        let wire = encode(&Message::Ping(PingMessage { nonce: 77 }), 13).unwrap();

        let converted = registry.convert(&wire, 13, 8).unwrap();
        assert_eq!(converted.version(), 8);
        assert_eq!(
            converted.decode().unwrap(),
            &Message::Ping(PingMessage { nonce: 77 })
        );
    }

    #[test]
    fn test_size_delta_composes() {
        let registry = registry();
        let up = registry.size_delta(MessageKind::Ping, 13, 22).unwrap();
        let down = registry.size_delta(MessageKind::Ping, 22, 13).unwrap();
        assert_eq!(up, 0);
        assert_eq!(down, 0);
        assert_eq!(registry.size_delta(MessageKind::Tx, 20, 15).unwrap(), -1);
        assert_eq!(registry.size_delta(MessageKind::Tx, 22, 6).unwrap(), -22);
    }
}
