//! Message header layouts
//!
//! ```text
//! legacy (v1-v3):    [command 12][payload_len 4 LE]                      = 16 bytes
//! sequenced (v4+):   [FF FE FD FC][command 12][payload_len 4 LE]         = 20 bytes
//!                    ... payload ... [control flags 1]
//! ```
//!
//! `payload_len` counts every byte after the header, including the trailing
//! control-flag byte of the sequenced framing.

use std::fmt;

use bytes::{BufMut, BytesMut};

use super::{Validation, WireError, WireResult, SEQUENCED_FRAMING_VERSION, STARTING_SEQUENCE};

/// Width of the NUL-padded command tag
pub const COMMAND_LEN: usize = 12;

/// Width of the little-endian payload length field
pub const PAYLOAD_LEN_FIELD: usize = 4;

/// The tag + length pair shared by every framing
pub const COMMON_HEADER_LEN: usize = COMMAND_LEN + PAYLOAD_LEN_FIELD;

/// Byte layout of the frame around a message body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Framing {
    /// No starting sequence, no control flag
    Legacy,
    /// Starting sequence prefix and trailing control flag
    Sequenced,
}

impl Framing {
    pub fn for_version(version: u32) -> Self {
        if version >= SEQUENCED_FRAMING_VERSION {
            Framing::Sequenced
        } else {
            Framing::Legacy
        }
    }

    /// Guess the framing from the first bytes of a stream.
    ///
    /// Returns `None` until at least the starting-sequence width is buffered.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < STARTING_SEQUENCE.len() {
            return None;
        }
        if bytes.starts_with(&STARTING_SEQUENCE) {
            Some(Framing::Sequenced)
        } else {
            Some(Framing::Legacy)
        }
    }

    pub const fn prefix_len(self) -> usize {
        match self {
            Framing::Legacy => 0,
            Framing::Sequenced => STARTING_SEQUENCE.len(),
        }
    }

    pub const fn header_len(self) -> usize {
        self.prefix_len() + COMMON_HEADER_LEN
    }

    pub const fn control_flag_len(self) -> usize {
        match self {
            Framing::Legacy => 0,
            Framing::Sequenced => 1,
        }
    }
}

/// Fixed-width ASCII command tag, NUL padded
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Command([u8; COMMAND_LEN]);

impl Command {
    /// Build a tag from a string of at most 12 ASCII bytes
    pub const fn new(tag: &str) -> Self {
        let bytes = tag.as_bytes();
        assert!(bytes.len() <= COMMAND_LEN, "command tag longer than 12 bytes");

        let mut out = [0u8; COMMAND_LEN];
        let mut i = 0;
        while i < bytes.len() {
            out[i] = bytes[i];
            i += 1;
        }
        Self(out)
    }

    pub const fn from_bytes(bytes: [u8; COMMAND_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; COMMAND_LEN] {
        &self.0
    }

    /// Tag text with the NUL padding stripped
    pub fn as_str(&self) -> String {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(COMMAND_LEN);
        String::from_utf8_lossy(&self.0[..end]).into_owned()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command({:?})", self.as_str())
    }
}

/// Control flag byte trailing every sequenced frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlFlags(u8);

impl ControlFlags {
    pub const VALID: ControlFlags = ControlFlags(0x01);

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 & Self::VALID.0 != 0
    }

    /// Reject flags without the validity bit
    pub fn validate(self) -> WireResult<Self> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(Validation::InvalidControlFlag(self.0).into())
        }
    }
}

impl Default for ControlFlags {
    fn default() -> Self {
        Self::VALID
    }
}

/// Decoded command tag and payload length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommonHeader {
    pub command: Command,
    pub payload_len: u32,
}

impl CommonHeader {
    pub fn new(command: Command, payload_len: u32) -> Self {
        Self {
            command,
            payload_len,
        }
    }

    /// Read the header region of `buf` without touching the payload
    pub fn unpack(buf: &[u8], framing: Framing) -> WireResult<Self> {
        let header_len = framing.header_len();
        if buf.len() < header_len {
            return Err(WireError::insufficient(header_len, buf.len()));
        }

        if framing == Framing::Sequenced && buf[..STARTING_SEQUENCE.len()] != STARTING_SEQUENCE {
            let mut seen = [0u8; 4];
            seen.copy_from_slice(&buf[..STARTING_SEQUENCE.len()]);
            return Err(Validation::BadStartingSequence(seen).into());
        }

        let offset = framing.prefix_len();
        let mut command = [0u8; COMMAND_LEN];
        command.copy_from_slice(&buf[offset..offset + COMMAND_LEN]);

        let len_offset = offset + COMMAND_LEN;
        let payload_len = u32::from_le_bytes([
            buf[len_offset],
            buf[len_offset + 1],
            buf[len_offset + 2],
            buf[len_offset + 3],
        ]);

        Ok(Self {
            command: Command(command),
            payload_len,
        })
    }

    /// Write the header for `framing` into `out`
    pub fn write(&self, framing: Framing, out: &mut BytesMut) {
        if framing == Framing::Sequenced {
            out.put_slice(&STARTING_SEQUENCE);
        }
        out.put_slice(self.command.as_bytes());
        out.put_u32_le(self.payload_len);
    }

    /// Full frame length this header describes
    pub fn message_len(&self, framing: Framing) -> usize {
        framing.header_len() + self.payload_len as usize
    }
}

/// Check that `buf` holds exactly the payload the header declares
pub fn validate_payload(buf: &[u8], header: &CommonHeader, framing: Framing) -> WireResult<()> {
    let declared = header.payload_len as usize;
    let actual = buf.len().saturating_sub(framing.header_len());

    if actual != declared {
        return Err(WireError::PayloadLengthMismatch { declared, actual });
    }
    if declared < framing.control_flag_len() {
        return Err(WireError::malformed("frame", "payload too short for control flag"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framing_by_version() {
        assert_eq!(Framing::for_version(1), Framing::Legacy);
        assert_eq!(Framing::for_version(3), Framing::Legacy);
        assert_eq!(Framing::for_version(4), Framing::Sequenced);
        assert_eq!(Framing::for_version(22), Framing::Sequenced);

        assert_eq!(Framing::Legacy.header_len(), 16);
        assert_eq!(Framing::Sequenced.header_len(), 20);
        assert_eq!(Framing::Sequenced.control_flag_len(), 1);
    }

    #[test]
    fn test_framing_detection() {
        assert_eq!(Framing::detect(&[0xFF, 0xFE]), None);
        assert_eq!(
            Framing::detect(&[0xFF, 0xFE, 0xFD, 0xFC, b'h']),
            Some(Framing::Sequenced)
        );
        assert_eq!(Framing::detect(b"hello\0\0"), Some(Framing::Legacy));
    }

    #[test]
    fn test_command_padding() {
        let cmd = Command::new("ping");
        assert_eq!(&cmd.as_bytes()[..4], b"ping");
        assert!(cmd.as_bytes()[4..].iter().all(|&b| b == 0));
        assert_eq!(cmd.as_str(), "ping");
        assert_eq!(Command::new("twelve_bytes").as_str(), "twelve_bytes");
    }

    #[test]
    fn test_write_then_unpack() {
        for framing in [Framing::Legacy, Framing::Sequenced] {
            let header = CommonHeader::new(Command::new("broadcast"), 0x0102_0304);
            let mut out = BytesMut::new();
            header.write(framing, &mut out);

            assert_eq!(out.len(), framing.header_len());
            assert_eq!(&out[out.len() - 4..], &[0x04, 0x03, 0x02, 0x01]);
            assert_eq!(CommonHeader::unpack(&out, framing).unwrap(), header);
        }
    }

    #[test]
    fn test_unpack_needs_full_header() {
        let err = CommonHeader::unpack(&[0u8; 10], Framing::Legacy).unwrap_err();
        assert_eq!(
            err,
            WireError::InsufficientData {
                needed: 16,
                available: 10
            }
        );
    }

    #[test]
    fn test_unpack_rejects_bad_sequence() {
        let mut buf = vec![0xAA, 0xBB, 0xCC, 0xDD];
        buf.extend_from_slice(Command::new("ack").as_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());

        let err = CommonHeader::unpack(&buf, Framing::Sequenced).unwrap_err();
        assert_eq!(
            err,
            WireError::Validation(Validation::BadStartingSequence([0xAA, 0xBB, 0xCC, 0xDD]))
        );
    }

    #[test]
    fn test_validate_payload() {
        let header = CommonHeader::new(Command::new("tx"), 100);
        let mut buf = BytesMut::new();
        header.write(Framing::Sequenced, &mut buf);
        buf.extend_from_slice(&[0u8; 50]);

        assert_eq!(
            validate_payload(&buf, &header, Framing::Sequenced).unwrap_err(),
            WireError::PayloadLengthMismatch {
                declared: 100,
                actual: 50
            }
        );

        buf.extend_from_slice(&[0u8; 50]);
        assert!(validate_payload(&buf, &header, Framing::Sequenced).is_ok());
    }

    #[test]
    fn test_sequenced_payload_needs_flag_byte() {
        let header = CommonHeader::new(Command::new("ack"), 0);
        let mut buf = BytesMut::new();
        header.write(Framing::Sequenced, &mut buf);

        assert!(matches!(
            validate_payload(&buf, &header, Framing::Sequenced),
            Err(WireError::Validation(Validation::Malformed { .. }))
        ));
        assert!(validate_payload(&buf[4..], &header, Framing::Legacy).is_ok());
    }

    #[test]
    fn test_control_flags() {
        assert!(ControlFlags::VALID.is_valid());
        assert!(ControlFlags::from_bits(0x03).validate().is_ok());
        assert_eq!(
            ControlFlags::from_bits(0x00).validate().unwrap_err(),
            WireError::Validation(Validation::InvalidControlFlag(0))
        );
    }
}
