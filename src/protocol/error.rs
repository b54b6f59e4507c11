//! Wire protocol errors
//!
//! Every failure in the framing, factory and converter layers surfaces as a
//! [`WireError`]. Nothing in this crate retries; the connection layer decides
//! whether an error penalizes or disconnects the peer.

use thiserror::Error;

use super::MessageKind;

/// Errors produced while framing, parsing or converting messages
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Not enough bytes buffered yet. Not a protocol violation.
    #[error("Insufficient data: need {needed} bytes, have {available}")]
    InsufficientData { needed: usize, available: usize },

    /// A range whose start lies past its end
    #[error("Invalid range: start {start} is past end {end}")]
    InvalidRange { start: usize, end: usize },

    #[error("Payload length mismatch: header declares {declared} bytes, found {actual}")]
    PayloadLengthMismatch { declared: usize, actual: usize },

    #[error("Unrecognized command '{command}' for protocol version {version}")]
    UnrecognizedCommand { command: String, version: u32 },

    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u32),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Cannot convert {kind} from v{from} to v{to}: {reason}")]
    UnsupportedConversion {
        kind: MessageKind,
        from: u32,
        to: u32,
        reason: &'static str,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] Validation),
}

/// Validation failures, kept apart from generic malformation for telemetry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    #[error("invalid control flags {0:#04x}")]
    InvalidControlFlag(u8),

    #[error("payload of {size} bytes exceeds maximum of {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("invalid starting sequence {0:02x?}")]
    BadStartingSequence([u8; 4]),

    #[error("no default configured for {0}")]
    MissingDefault(&'static str),

    #[error("invalid setting {0}")]
    InvalidSetting(&'static str),

    #[error("malformed {kind} body: {reason}")]
    Malformed { kind: &'static str, reason: String },
}

impl WireError {
    pub(crate) fn insufficient(needed: usize, available: usize) -> Self {
        WireError::InsufficientData { needed, available }
    }

    pub(crate) fn malformed(kind: &'static str, reason: impl Into<String>) -> Self {
        WireError::Validation(Validation::Malformed {
            kind,
            reason: reason.into(),
        })
    }

    /// Whether the error means "wait for more bytes" rather than a failure
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, WireError::InsufficientData { .. })
    }

    /// Whether the peer sent something that violates the protocol.
    ///
    /// Unrecognized commands are excluded: a peer on a newer version may
    /// legitimately send kinds this version does not know. Missing defaults
    /// and bad settings are local configuration problems.
    pub fn is_protocol_violation(&self) -> bool {
        match self {
            WireError::PayloadLengthMismatch { .. } => true,
            WireError::Validation(Validation::MissingDefault(_))
            | WireError::Validation(Validation::InvalidSetting(_)) => false,
            WireError::Validation(_) => true,
            _ => false,
        }
    }
}

pub type WireResult<T> = Result<T, WireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(WireError::insufficient(16, 3).is_insufficient_data());
        assert!(!WireError::insufficient(16, 3).is_protocol_violation());

        let mismatch = WireError::PayloadLengthMismatch {
            declared: 100,
            actual: 50,
        };
        assert!(mismatch.is_protocol_violation());

        let unknown = WireError::UnrecognizedCommand {
            command: "mystery".to_string(),
            version: 22,
        };
        assert!(!unknown.is_protocol_violation());

        let flag: WireError = Validation::InvalidControlFlag(0).into();
        assert!(flag.is_protocol_violation());

        let missing: WireError = Validation::MissingDefault("network_num").into();
        assert!(!missing.is_protocol_violation());
        let setting: WireError = Validation::InvalidSetting("max_message_size").into();
        assert!(!setting.is_protocol_violation());
        assert!(!WireError::InvalidRange { start: 4, end: 2 }.is_protocol_violation());
    }

    #[test]
    fn test_error_messages() {
        let err = WireError::malformed("tx", "truncated short id");
        assert_eq!(
            err.to_string(),
            "Validation error: malformed tx body: truncated short id"
        );
    }
}
