//! Connection handling for relay peers
//!
//! Manages one peer connection, including:
//! - Hello exchange and version negotiation
//! - Message extraction from the byte stream
//! - Conversion to and from the peer's version

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::NetworkConfig;
use crate::messages::{HelloMessage, PingMessage, NONCE_VERSION};
use crate::protocol::{
    encode, Message, MessageKind, MessageStream, VersionRegistry, WireError, WireMessage,
};

/// Connection errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Wire(#[from] WireError),

    #[error("Connection closed")]
    Closed,

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Unsupported peer protocol version: local={local}, remote={remote}")]
    UnsupportedVersion { local: u32, remote: u32 },

    #[error("Connection timeout")]
    Timeout,
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// State of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Stream open, hello not exchanged yet
    Connecting,
    /// Session version agreed, ready for communication
    Connected,
    /// Connection has been closed
    Closed,
}

/// Connection statistics
#[derive(Debug, Default, Clone)]
pub struct ConnectionStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Messages re-encoded between the local and peer versions
    pub messages_converted: u64,
    /// Round-trip time (microseconds)
    pub rtt_us: u64,
}

/// A connection to a remote peer over any async byte stream
pub struct Connection<S> {
    stream: S,
    registry: Arc<VersionRegistry>,
    messages: MessageStream,
    /// Messages that arrived while a ping was waiting for its pong
    pending: VecDeque<WireMessage>,
    config: NetworkConfig,
    node_id: Uuid,
    /// Session version, set by negotiation
    peer_version: Option<u32>,
    peer_node_id: Option<Uuid>,
    state: ConnectionState,
    last_activity: Instant,
    stats: ConnectionStats,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        registry: Arc<VersionRegistry>,
        node_id: Uuid,
        config: NetworkConfig,
    ) -> Self {
        let messages = MessageStream::for_version(registry.local_version());
        Self {
            stream,
            registry,
            messages,
            pending: VecDeque::new(),
            config,
            node_id,
            peer_version: None,
            peer_node_id: None,
            state: ConnectionState::Connecting,
            last_activity: Instant::now(),
            stats: ConnectionStats::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Session version, once negotiated
    pub fn peer_version(&self) -> Option<u32> {
        self.peer_version
    }

    /// Node id from the peer's hello, nil for peers that predate node ids
    pub fn peer_node_id(&self) -> Option<Uuid> {
        self.peer_node_id
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, ConnectionState::Connected)
    }

    /// Get time since last activity
    pub fn idle_time(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Exchange hellos and settle on the lower of the two versions
    pub async fn negotiate(&mut self) -> ConnectionResult<u32> {
        let local = self.registry.local_version();
        let hello = HelloMessage::new(local, self.config.network_num, self.node_id);
        let wire = encode(&Message::Hello(hello), local)?;
        self.write_frame(&wire).await?;

        let timeout = Duration::from_millis(self.config.handshake_timeout_ms);
        let session = match tokio::time::timeout(timeout, self.read_peer_version()).await {
            Ok(result) => result?,
            Err(_) => return Err(ConnectionError::Timeout),
        };

        if !self.registry.is_supported(session) {
            warn!("Rejecting peer on unsupported protocol v{}", session);
            return Err(ConnectionError::UnsupportedVersion {
                local,
                remote: session,
            });
        }

        let (factory, _) = self.registry.get_factory(session)?;
        self.messages.switch_factory(factory);

        // The hello itself is framed like every later message of the session
        let hello = self
            .messages
            .try_extract_message()?
            .ok_or_else(|| ConnectionError::HandshakeFailed("truncated hello".to_string()))?;
        if hello.kind() != MessageKind::Hello {
            return Err(ConnectionError::HandshakeFailed(format!(
                "expected hello, got {}",
                hello.kind()
            )));
        }
        // A newer peer's hello may carry fields this version cannot read
        if let Ok(Message::Hello(peer)) = hello.decode() {
            self.peer_node_id = Some(peer.node_id);
        }

        self.peer_version = Some(session);
        self.state = ConnectionState::Connected;
        self.stats.messages_received += 1;
        info!("Handshake complete, session protocol v{}", session);

        Ok(session)
    }

    /// Receive the next message, converted to the local version.
    ///
    /// Returns `None` when the peer closes the stream between messages.
    pub async fn recv(&mut self) -> ConnectionResult<Option<WireMessage>> {
        self.session_version()?;
        if let Some(msg) = self.pending.pop_front() {
            return Ok(Some(msg));
        }
        self.read_message().await
    }

    async fn read_message(&mut self) -> ConnectionResult<Option<WireMessage>> {
        let peer = self.session_version()?;
        let local = self.registry.local_version();

        loop {
            match self.messages.try_extract_message() {
                Ok(Some(msg)) => {
                    self.stats.messages_received += 1;
                    self.last_activity = Instant::now();
                    if peer == local {
                        return Ok(Some(msg));
                    }
                    let converted = self.registry.convert(&msg, peer, local)?;
                    self.stats.messages_converted += 1;
                    return Ok(Some(converted));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Failed to parse message from peer: {}", e);
                    return Err(e.into());
                }
            }

            if self.fill().await? == 0 {
                if self.messages.buffered() == 0 {
                    return Ok(None); // Clean close
                } else {
                    return Err(ConnectionError::Closed);
                }
            }
        }
    }

    /// Try to receive a message with a timeout
    pub async fn recv_timeout(&mut self, timeout: Duration) -> ConnectionResult<Option<WireMessage>> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout),
        }
    }

    /// Send a local-version message, converted to the session version
    pub async fn send(&mut self, msg: &WireMessage) -> ConnectionResult<()> {
        let peer = self.session_version()?;
        let local = self.registry.local_version();

        if msg.version() == peer {
            return self.write_frame(msg).await;
        }
        let converted = self.registry.convert(msg, local, peer)?;
        self.stats.messages_converted += 1;
        self.write_frame(&converted).await
    }

    /// Encode and send a message
    pub async fn send_message(&mut self, message: &Message) -> ConnectionResult<()> {
        let wire = encode(message, self.registry.local_version())?;
        self.send(&wire).await
    }

    /// Send a ping and wait for the matching pong.
    ///
    /// Other messages received meanwhile are queued for [`Connection::recv`].
    pub async fn ping(&mut self) -> ConnectionResult<Duration> {
        self.ping_with_nonce(Uuid::new_v4().as_u128() as u64).await
    }

    async fn ping_with_nonce(&mut self, nonce: u64) -> ConnectionResult<Duration> {
        let start = Instant::now();
        self.send_message(&Message::Ping(PingMessage { nonce })).await?;

        match tokio::time::timeout(Duration::from_secs(5), self.await_pong(nonce)).await {
            Ok(result) => result?,
            Err(_) => return Err(ConnectionError::Timeout),
        }

        let rtt = start.elapsed();
        self.stats.rtt_us = rtt.as_micros() as u64;
        Ok(rtt)
    }

    async fn await_pong(&mut self, nonce: u64) -> ConnectionResult<()> {
        // Peers before nonces echo an empty pong
        let expected = if self.session_version()? < NONCE_VERSION {
            0
        } else {
            nonce
        };

        loop {
            let msg = self.read_message().await?.ok_or(ConnectionError::Closed)?;
            let pong_nonce = match msg.decode()? {
                Message::Pong(pong) => Some(pong.nonce),
                _ => None,
            };
            match pong_nonce {
                Some(n) if n == expected => return Ok(()),
                Some(n) => debug!("Ignoring pong with stale nonce {}", n),
                None => self.pending.push_back(msg),
            }
        }
    }

    /// Close the connection gracefully
    pub async fn close(&mut self) -> ConnectionResult<()> {
        if self.is_active() {
            self.send_message(&Message::Disconnect).await?;
        }
        self.stream.shutdown().await?;
        self.state = ConnectionState::Closed;
        Ok(())
    }

    async fn read_peer_version(&mut self) -> ConnectionResult<u32> {
        loop {
            if let Some(session) = self.registry.negotiate(&mut self.messages) {
                return Ok(session);
            }
            if self.messages.buffered() >= crate::protocol::HELLO_VERSION_WINDOW {
                return Err(ConnectionError::HandshakeFailed(
                    "peer did not open with hello".to_string(),
                ));
            }
            if self.fill().await? == 0 {
                return Err(ConnectionError::HandshakeFailed(
                    "connection closed during handshake".to_string(),
                ));
            }
        }
    }

    /// Read once from the socket into the message stream
    async fn fill(&mut self) -> ConnectionResult<usize> {
        let mut buf = BytesMut::with_capacity(self.config.read_buffer_size);
        let n = self.stream.read_buf(&mut buf).await?;
        if n > 0 {
            self.stats.bytes_received += n as u64;
            self.messages.feed(buf.freeze());
        }
        Ok(n)
    }

    async fn write_frame(&mut self, msg: &WireMessage) -> ConnectionResult<()> {
        self.stream.write_all(msg.as_bytes()).await?;
        self.stream.flush().await?;

        self.stats.messages_sent += 1;
        self.stats.bytes_sent += msg.len() as u64;
        self.last_activity = Instant::now();
        debug!("Sent {} ({} bytes) as v{}", msg.kind(), msg.len(), msg.version());

        Ok(())
    }

    fn session_version(&self) -> ConnectionResult<u32> {
        self.peer_version
            .ok_or_else(|| ConnectionError::HandshakeFailed("not negotiated".to_string()))
    }
}
