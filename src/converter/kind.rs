//! Converter for a single message kind
//!
//! Every kind shares one canonical [`Message`] form, so a single generic
//! converter covers the whole version matrix: decode under the source
//! version, fill defaults, encode under the target version.

use bytes::{Bytes, BytesMut};

use super::{ConversionDefaults, MessageConverter};
use crate::messages::NETWORK_NUM_VERSION;
use crate::protocol::{
    encode_with_flags, CommonHeader, ControlFlags, Framing, Message, MessageKind, PartialLayout,
    Validation, WireError, WireMessage, WireResult,
};

/// Converts `kind` between `older` and `newer`
#[derive(Debug, Clone, Copy)]
pub struct KindConverter {
    kind: MessageKind,
    older: u32,
    newer: u32,
    defaults: ConversionDefaults,
}

impl KindConverter {
    pub fn new(kind: MessageKind, older: u32, newer: u32, defaults: ConversionDefaults) -> Self {
        debug_assert!(older <= newer);
        Self {
            kind,
            older,
            newer,
            defaults,
        }
    }

    fn convert(&self, msg: &WireMessage, from: u32, to: u32) -> WireResult<WireMessage> {
        self.check_kind(msg.kind())?;
        if msg.version() != from {
            return Err(WireError::TypeMismatch {
                expected: format!("v{} {}", from, self.kind),
                actual: format!("v{} {}", msg.version(), msg.kind()),
            });
        }
        self.check_available(from, to)?;

        let mut message = msg.decode()?.clone();
        if to > from {
            self.fill_defaults(&mut message)?;
        }

        let flags = match (Framing::for_version(from), Framing::for_version(to)) {
            (Framing::Sequenced, Framing::Sequenced) => {
                msg.control_flags().unwrap_or(ControlFlags::VALID)
            }
            _ => ControlFlags::VALID,
        };

        let mut converted = encode_with_flags(&message, to, flags)?;
        converted.set_priority(msg.priority());
        Ok(converted)
    }

    fn convert_first_bytes(&self, prefix: &[u8], from: u32, to: u32) -> WireResult<Bytes> {
        let (source, target) = self.partial_layouts(from, to)?;
        let source_framing = Framing::for_version(from);
        let target_framing = Framing::for_version(to);

        let header_len = source_framing.header_len();
        check_region_len(prefix, header_len + source.fixed_len)?;

        let header = CommonHeader::unpack(prefix, source_framing)?;
        self.check_command(&header)?;

        let source_overhead = source.fixed_len + source_framing.control_flag_len();
        let target_overhead = target.fixed_len + target_framing.control_flag_len();
        let tail_len = (header.payload_len as usize)
            .checked_sub(source_overhead)
            .ok_or_else(|| {
                WireError::malformed(self.kind.name(), "payload shorter than fixed region")
            })?;
        let payload_len = u32::try_from(tail_len + target_overhead)
            .map_err(|_| WireError::malformed(self.kind.name(), "payload exceeds u32 length field"))?;

        let fixed = Bytes::copy_from_slice(&prefix[header_len..]);
        let mut message = Message::decode_fixed(self.kind, &fixed, from)?;
        if to > from {
            self.fill_defaults(&mut message)?;
        }

        let mut out = BytesMut::with_capacity(target_framing.header_len() + target.fixed_len);
        CommonHeader::new(header.command, payload_len).write(target_framing, &mut out);
        message.encode_fixed(to, &mut out)?;
        debug_assert_eq!(out.len(), target_framing.header_len() + target.fixed_len);

        Ok(out.freeze())
    }

    fn convert_last_bytes(&self, suffix: &[u8], from: u32, to: u32) -> WireResult<Bytes> {
        self.partial_layouts(from, to)?;
        let source_framing = Framing::for_version(from);
        check_region_len(suffix, source_framing.control_flag_len())?;

        if let Some(&bits) = suffix.first() {
            ControlFlags::from_bits(bits).validate()?;
        }

        Ok(match (source_framing, Framing::for_version(to)) {
            (Framing::Sequenced, Framing::Sequenced) => Bytes::copy_from_slice(suffix),
            (Framing::Legacy, Framing::Sequenced) => {
                Bytes::copy_from_slice(&[ControlFlags::VALID.bits()])
            }
            (_, Framing::Legacy) => Bytes::new(),
        })
    }

    fn size_delta(&self, from: u32, to: u32) -> WireResult<isize> {
        let (source, target) = self.partial_layouts(from, to)?;
        let frame = |version: u32, layout: PartialLayout| {
            let framing = Framing::for_version(version);
            (framing.header_len() + layout.fixed_len + framing.control_flag_len()) as isize
        };
        Ok(frame(to, target) - frame(from, source))
    }

    /// Layouts of both versions, when the kind's tail is identical in them
    fn partial_layouts(&self, from: u32, to: u32) -> WireResult<(PartialLayout, PartialLayout)> {
        self.check_available(from, to)?;
        let unsupported = |reason| WireError::UnsupportedConversion {
            kind: self.kind,
            from,
            to,
            reason,
        };

        let source = self
            .kind
            .partial_layout(from)
            .ok_or_else(|| unsupported("kind must be converted whole"))?;
        let target = self
            .kind
            .partial_layout(to)
            .ok_or_else(|| unsupported("kind must be converted whole"))?;
        if source.tail_revision != target.tail_revision {
            return Err(unsupported("body differs between versions"));
        }
        Ok((source, target))
    }

    fn fill_defaults(&self, message: &mut Message) -> WireResult<()> {
        if self.kind.is_broadcast() && self.older < NETWORK_NUM_VERSION {
            let network_num = self
                .defaults
                .network_num
                .ok_or(Validation::MissingDefault("network_num"))?;
            message.set_network_num(network_num);
        }
        Ok(())
    }

    fn check_kind(&self, kind: MessageKind) -> WireResult<()> {
        if kind != self.kind {
            return Err(WireError::TypeMismatch {
                expected: self.kind.to_string(),
                actual: kind.to_string(),
            });
        }
        Ok(())
    }

    fn check_command(&self, header: &CommonHeader) -> WireResult<()> {
        if header.command != self.kind.command() {
            return Err(WireError::TypeMismatch {
                expected: self.kind.to_string(),
                actual: header.command.as_str(),
            });
        }
        Ok(())
    }

    fn check_available(&self, from: u32, to: u32) -> WireResult<()> {
        if !self.kind.is_available_in(self.older) {
            return Err(WireError::UnsupportedConversion {
                kind: self.kind,
                from,
                to,
                reason: "kind does not exist in the older version",
            });
        }
        Ok(())
    }
}

/// Partial regions must have exactly the expected length
fn check_region_len(region: &[u8], expected: usize) -> WireResult<()> {
    if region.len() < expected {
        return Err(WireError::insufficient(expected, region.len()));
    }
    if region.len() > expected {
        return Err(WireError::PayloadLengthMismatch {
            declared: expected,
            actual: region.len(),
        });
    }
    Ok(())
}

impl MessageConverter for KindConverter {
    fn kind(&self) -> MessageKind {
        self.kind
    }

    fn older_version(&self) -> u32 {
        self.older
    }

    fn newer_version(&self) -> u32 {
        self.newer
    }

    fn convert_to_older(&self, msg: &WireMessage) -> WireResult<WireMessage> {
        self.convert(msg, self.newer, self.older)
    }

    fn convert_from_older(&self, msg: &WireMessage) -> WireResult<WireMessage> {
        self.convert(msg, self.older, self.newer)
    }

    fn convert_first_bytes_to_older(&self, prefix: &[u8]) -> WireResult<Bytes> {
        self.convert_first_bytes(prefix, self.newer, self.older)
    }

    fn convert_first_bytes_from_older(&self, prefix: &[u8]) -> WireResult<Bytes> {
        self.convert_first_bytes(prefix, self.older, self.newer)
    }

    fn convert_last_bytes_to_older(&self, suffix: &[u8]) -> WireResult<Bytes> {
        self.convert_last_bytes(suffix, self.newer, self.older)
    }

    fn convert_last_bytes_from_older(&self, suffix: &[u8]) -> WireResult<Bytes> {
        self.convert_last_bytes(suffix, self.older, self.newer)
    }

    fn size_delta_to_older(&self) -> WireResult<isize> {
        self.size_delta(self.newer, self.older)
    }

    fn size_delta_from_older(&self) -> WireResult<isize> {
        self.size_delta(self.older, self.newer)
    }
}
