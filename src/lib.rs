//! relaywire - Wire protocol core for a blockchain relay node
//!
//! Frames every control and data message exchanged between relay peers,
//! reassembles messages from streaming socket reads, and transcodes them
//! between the local protocol version and the older versions still deployed.

pub mod config;
pub mod converter;
pub mod messages;
pub mod network;
pub mod protocol;

pub use converter::{ConversionDefaults, ConverterSet, MessageConverter};
pub use protocol::{
    negotiate_version, Message, MessageFactory, MessageKind, MessageStream, Preview,
    ProtocolSettings, StreamAccumulator, VersionRegistry, WireError, WireMessage, WireResult,
    PROTOCOL_VERSION,
};
