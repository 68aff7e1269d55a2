//! IRC transport layer for async I/O.
//!
//! This module provides transport types for reading and writing IRC messages
//! over TCP, TLS (server and client), and WebSocket connections.
//!
//! # Features
//!
//! - [`Transport`]: High-level transport using `Framed` codec for owned [`Message`] types
//!   - [`Transport::tcp`]: Plain TCP connections
//!   - [`Transport::tls`]: Server-side TLS (for IRC servers)
//!   - [`Transport::client_tls`]: Client-side TLS (for IRC clients connecting to port 6697)
//!   - [`Transport::websocket`] / [`Transport::websocket_tls`]: WebSocket connections
//! - [`ZeroCopyTransport`]: Zero-allocation transport yielding borrowed [`MessageRef`] types
//! - [`LendingStream`]: Trait for streams that yield borrowed data
//!
//! # Usage
//!
//! Use [`Transport`] during connection handshake and capability negotiation,
//! then upgrade to [`ZeroCopyTransport`] for the hot loop:
//!
//! ```ignore
//! use slirc_proto::transport::{Transport, ZeroCopyTransportEnum};
//!
//! // Use Transport during handshake
//! let transport = Transport::tcp(stream);
//! // ... perform CAP negotiation ...
//!
//! // Upgrade to zero-copy for the hot loop
//! let mut zero_copy: ZeroCopyTransportEnum = transport.try_into()?;
//! while let Some(result) = zero_copy.next().await {
//!     let msg_ref = result?;
//!     // Process MessageRef without allocations
//! }
//!
//! // If you want to split the stream into separate read and write halves while
//! // preserving any bytes that were already read by the framed codec, use
//! // `Transport::into_parts()`:
//! //
//! // ```ignore
//! // // After handshake
//! // let parts = transport.into_parts()?;
//! // // Split into read/write halves
//! // let (read, write) = parts.split();
//! // // Seed the zero-copy reader with leftover bytes
//! // let mut zero_copy = ZeroCopyTransport::with_buffer(read.half, read.read_buf);
//! // // Create a framed writer using the write half and codec
//! // let mut writer = tokio_util::codec::FramedWrite::new(write.half, write.codec);
//! // ```
//! ```
//!
//! [`Message`]: crate::Message
//! [`MessageRef`]: crate::MessageRef

mod error;
mod framed;
mod parts;
mod zero_copy;

// Re-export all public types
pub use error::TransportReadError;
pub use framed::{Transport, WebSocketNotSupportedError};
pub use parts::{
    TransportParts, TransportRead, TransportReadHalf, TransportStream, TransportWrite,
    TransportWriteHalf,
};
#[cfg(feature = "tokio")]
pub use zero_copy::ZeroCopyWebSocketTransport;
pub use zero_copy::{LendingStream, ZeroCopyTransport, ZeroCopyTransportEnum};

/// Maximum IRC line length (8191 bytes as per modern IRC conventions).
pub const MAX_IRC_LINE_LEN: usize = 8191;

// =============================================================================
// Tests
// =============================================================================
