//! Protocol module - Defines the wire protocol for relay peers
//!
//! Every message is a header followed by a version-specific body:
//! - 4 byte starting sequence (v4 and later)
//! - 12 byte NUL-padded ASCII command tag
//! - 4 byte payload length (little-endian)
//! - Variable length body
//! - 1 byte control flag (v4 and later)

mod codec;
mod error;
mod factory;
mod header;
mod message;
mod stream;
mod version;
mod wire;

pub use codec::*;
pub use error::*;
pub use factory::*;
pub use header::*;
pub use message::*;
pub use stream::*;
pub use version::*;
pub use wire::*;

/// Protocol version this build speaks natively
pub const PROTOCOL_VERSION: u32 = 22;

/// Oldest protocol version the message catalogue describes
pub const MIN_KNOWN_VERSION: u32 = 1;

/// Oldest peer version accepted unless configured otherwise
pub const DEFAULT_MIN_SUPPORTED_VERSION: u32 = 6;

/// First version framed with the starting sequence and control flag
pub const SEQUENCED_FRAMING_VERSION: u32 = 4;

/// Largest payload accepted unless configured otherwise (64 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Sync bytes opening every sequenced frame
pub const STARTING_SEQUENCE: [u8; 4] = [0xFF, 0xFE, 0xFD, 0xFC];
