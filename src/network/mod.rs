//! Network module - Drives the wire protocol over a byte stream
//!
//! Provides:
//! - Version negotiation on a fresh connection
//! - Message extraction from socket reads
//! - Conversion between the local and peer protocol versions

mod connection;

pub use connection::*;

/// Configuration for peer connections
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Network number announced in our hello
    pub network_num: u32,
    /// Size of each socket read
    pub read_buffer_size: usize,
    /// Time allowed for the peer's hello
    pub handshake_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            network_num: 0,
            read_buffer_size: 64 * 1024,
            handshake_timeout_ms: 5000,
        }
    }
}

impl NetworkConfig {
    pub fn new(network_num: u32) -> Self {
        Self {
            network_num,
            ..Default::default()
        }
    }
}
