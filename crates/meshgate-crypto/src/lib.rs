//! # Meshgate Crypto
//!
//! Cryptographic primitives for meshgate's intra-cluster state replication.
//!
//! This crate provides:
//! - Authenticated frame sealing (Salsa20/12 + Poly1305, encrypt-then-MAC)
//! - Per-member key derivation from a shared master secret
//! - Constant-time comparisons for truncated authentication tags
//! - Secure random number generation
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Notes |
//! |----------|-----------|-------|
//! | Stream cipher | Salsa20/12 | per-frame key tweaked by the frame IV |
//! | MAC | Poly1305 | one-time key from keystream, NaCl construction |
//! | KDF | SHA-512 (double) | member keys from the 64-byte master secret |
//!
//! The frame construction matches NaCl `secretbox` except that the Poly1305
//! tag is truncated to 8 bytes to keep the per-frame overhead at 24 bytes.
//! Security of the truncated tag rests on strict per-frame key derivation:
//! the first 8 bytes of the random IV are XORed into the key, and the last
//! 8 bytes are the Salsa20 nonce, so no (key, nonce) pair ever repeats.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod constant_time;
pub mod error;
pub mod frame;
pub mod keys;
pub mod random;

pub use error::CryptoError;
pub use keys::{MasterSecret, MemberKey};

/// Master secret size (64 bytes, one SHA-512 digest).
pub const MASTER_SECRET_SIZE: usize = 64;

/// Per-member frame key size.
pub const MEMBER_KEY_SIZE: usize = 32;

/// Frame IV size (16 random bytes per frame).
pub const FRAME_IV_SIZE: usize = 16;

/// Truncated Poly1305 tag size carried on the wire.
pub const FRAME_TAG_SIZE: usize = 8;

/// Total sealed-frame overhead: IV followed by the truncated tag.
pub const FRAME_OVERHEAD: usize = FRAME_IV_SIZE + FRAME_TAG_SIZE;

/// Largest sealed frame accepted or produced.
pub const MAX_FRAME_LENGTH: usize = 65_536;
