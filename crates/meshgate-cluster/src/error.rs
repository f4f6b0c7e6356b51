//! Error types for the cluster coordination core.
//!
//! None of these are fatal and none cross the public entry points: a bad
//! frame or sub-message is traced and dropped (see the dispatcher in
//! [`crate::cluster`]). The enums exist for the codec layers and for
//! library users embedding the wire format.

use thiserror::Error;

/// Top-level cluster errors
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Wire decoding error
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Cryptographic error
    #[error("crypto error: {0}")]
    Crypto(#[from] meshgate_crypto::CryptoError),
}

/// Wire decoding errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// Read past the end of the buffer
    #[error("truncated read: needed {needed} more bytes, {remaining} remaining")]
    Truncated {
        /// Bytes the read required
        needed: usize,
        /// Bytes left in the buffer
        remaining: usize,
    },

    /// Unknown endpoint address-family tag
    #[error("invalid endpoint family tag: 0x{0:02X}")]
    InvalidEndpointTag(u8),

    /// Identity with a nil peer address
    #[error("invalid identity encoding")]
    InvalidIdentity,
}
