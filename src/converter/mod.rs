//! Message converters
//!
//! A converter transcodes one message kind between a newer and an older
//! protocol version, in both directions. Full conversion decodes and
//! re-encodes the whole message. Partial conversion rewrites only the first
//! bytes (header and fixed body region) and last bytes (control flag) of a
//! frame so a relay can forward a large body without buffering it; it is
//! only offered when the kind's opaque tail is byte-identical in both
//! versions.

mod kind;

pub use kind::KindConverter;

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use tracing::debug;

use crate::protocol::{MessageKind, WireError, WireMessage, WireResult};

/// Values given to fields an older version does not carry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionDefaults {
    pub network_num: Option<u32>,
}

/// Bidirectional transcoder for one kind across one version boundary
pub trait MessageConverter: Send + Sync + fmt::Debug {
    fn kind(&self) -> MessageKind;

    fn older_version(&self) -> u32;

    fn newer_version(&self) -> u32;

    /// Re-encode a newer-version message for the older version, dropping
    /// fields the older version lacks
    fn convert_to_older(&self, msg: &WireMessage) -> WireResult<WireMessage>;

    /// Re-encode an older-version message for the newer version, filling
    /// missing fields with defaults
    fn convert_from_older(&self, msg: &WireMessage) -> WireResult<WireMessage>;

    /// Rewrite exactly the header and fixed body region of a newer frame
    fn convert_first_bytes_to_older(&self, prefix: &[u8]) -> WireResult<Bytes>;

    fn convert_first_bytes_from_older(&self, prefix: &[u8]) -> WireResult<Bytes>;

    /// Rewrite exactly the trailing control-flag region of a newer frame
    fn convert_last_bytes_to_older(&self, suffix: &[u8]) -> WireResult<Bytes>;

    fn convert_last_bytes_from_older(&self, suffix: &[u8]) -> WireResult<Bytes>;

    /// Frame length change of a conversion to the older version
    fn size_delta_to_older(&self) -> WireResult<isize>;

    fn size_delta_from_older(&self) -> WireResult<isize>;
}

/// Converters for every kind shared by an older version and the newer one
#[derive(Debug)]
pub struct ConverterSet {
    older: u32,
    newer: u32,
    converters: HashMap<MessageKind, Box<dyn MessageConverter>>,
}

impl ConverterSet {
    pub fn new(older: u32, newer: u32, defaults: ConversionDefaults) -> Self {
        let converters: HashMap<_, _> = MessageKind::ALL
            .into_iter()
            .filter(|kind| kind.is_available_in(older))
            .map(|kind| {
                let converter: Box<dyn MessageConverter> =
                    Box::new(KindConverter::new(kind, older, newer, defaults));
                (kind, converter)
            })
            .collect();

        debug!(
            "Built {} converters between v{} and v{}",
            converters.len(),
            older,
            newer
        );

        Self {
            older,
            newer,
            converters,
        }
    }

    pub fn older_version(&self) -> u32 {
        self.older
    }

    pub fn newer_version(&self) -> u32 {
        self.newer
    }

    pub fn converter(&self, kind: MessageKind) -> WireResult<&dyn MessageConverter> {
        self.converters
            .get(&kind)
            .map(Box::as_ref)
            .ok_or(WireError::UnsupportedConversion {
                kind,
                from: self.newer,
                to: self.older,
                reason: "kind does not exist in the older version",
            })
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_covers_shared_kinds() {
        let set = ConverterSet::new(8, 22, ConversionDefaults::default());
        assert!(set.converter(MessageKind::Tx).is_ok());
        assert!(set.converter(MessageKind::BlockHolding).is_ok());
        assert!(matches!(
            set.converter(MessageKind::Notification),
            Err(WireError::UnsupportedConversion { from: 22, to: 8, .. })
        ));
        assert_eq!(set.len(), 11);
    }

    #[test]
    fn test_converter_bounds() {
        let set = ConverterSet::new(15, 22, ConversionDefaults::default());
        let converter = set.converter(MessageKind::Tx).unwrap();
        assert_eq!(converter.kind(), MessageKind::Tx);
        assert_eq!(converter.older_version(), 15);
        assert_eq!(converter.newer_version(), 22);
    }
}
