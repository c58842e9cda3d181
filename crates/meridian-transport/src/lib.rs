//! # meridian-transport
//!
//! Wire plumbing for the Meridian protocol.
//!
//! - [`envelope`] — canonical encoding of `(type_tag, payload)`, the exact
//!   bytes every signature covers
//! - [`cbor`] — CBOR helpers for envelope payloads
//! - [`messages`] — `refactor_network` frames and RPC method names
//! - [`stream`] — in-memory bidirectional frame streams
//!
//! ## Layering
//!
//! ```text
//! Typed payload (NodeIdentity, TopologyProposal, ...)
//!     |  cbor
//!     v
//! payload bytes
//!     |  envelope::encode(type_tag, payload)
//!     v
//! canonical bytes  <-- signed
//!     |  envelope::to_wire (bytes + detached signature)
//!     v
//! WireEnvelope inside a RequestFrame / ResponseFrame (JSON line)
//! ```

pub mod cbor;
pub mod envelope;
pub mod messages;
pub mod stream;

/// Error types for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Canonical envelope bytes were rejected by the decoder.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// CBOR serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// CBOR deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// The other end of a frame stream went away.
    #[error("stream closed")]
    Closed,
}

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
