//! Peer addresses and identities.
//!
//! End-peers are named by a 40-bit address. A peer identity binds that
//! address to a public key; the private half exists only in the local
//! node's [`LocalIdentity`] and is never serialized by this crate.

use crate::error::WireError;
use crate::wire::{Reader, Writer};
use meshgate_crypto::MasterSecret;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Public key size in a peer identity.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// A 40-bit end-peer address.
///
/// Order matches numeric order; the all-zero address is reserved as nil.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerAddr(u64);

impl PeerAddr {
    /// Wire size in bytes.
    pub const SIZE: usize = 5;

    /// The reserved nil address.
    pub const NIL: PeerAddr = PeerAddr(0);

    /// Build from an integer, masking to 40 bits.
    #[must_use]
    pub fn from_u64(v: u64) -> Self {
        Self(v & 0x00ff_ffff_ffff)
    }

    /// Build from the 5-byte big-endian wire form.
    #[must_use]
    pub fn from_bytes(b: [u8; Self::SIZE]) -> Self {
        Self(
            (u64::from(b[0]) << 32)
                | (u64::from(b[1]) << 24)
                | (u64::from(b[2]) << 16)
                | (u64::from(b[3]) << 8)
                | u64::from(b[4]),
        )
    }

    /// The 5-byte big-endian wire form.
    #[must_use]
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        [
            (self.0 >> 32) as u8,
            (self.0 >> 24) as u8,
            (self.0 >> 16) as u8,
            (self.0 >> 8) as u8,
            self.0 as u8,
        ]
    }

    /// Integer form.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// True for the reserved nil address.
    #[must_use]
    pub fn is_nil(self) -> bool {
        self.0 == 0
    }

    /// Append the 5-byte wire form.
    pub fn write(self, w: &mut Writer<'_>) {
        w.put_bytes(&self.to_bytes());
    }

    /// Read the 5-byte wire form.
    ///
    /// # Errors
    ///
    /// `WireError::Truncated` if fewer than 5 bytes remain.
    pub fn read(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let b = r.read_bytes(Self::SIZE)?;
        Ok(Self::from_bytes([b[0], b[1], b[2], b[3], b[4]]))
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:010x}", self.0)
    }
}

impl fmt::Debug for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerAddr({self})")
    }
}

/// Public identity of an end-peer.
///
/// Wire form: 5-byte address, 32-byte public key, and a secret-length byte
/// that is always written as zero (the private key never goes on the
/// wire; a nonzero length from a peer is skipped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    address: PeerAddr,
    public_key: [u8; PUBLIC_KEY_SIZE],
}

impl PeerIdentity {
    /// Bind an address to a public key.
    #[must_use]
    pub fn new(address: PeerAddr, public_key: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self {
            address,
            public_key,
        }
    }

    /// The peer's 40-bit address.
    #[must_use]
    pub fn address(&self) -> PeerAddr {
        self.address
    }

    /// The peer's public key.
    #[must_use]
    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.public_key
    }

    /// Append the wire form (never includes private material).
    pub fn write(&self, w: &mut Writer<'_>) {
        self.address.write(w);
        w.put_bytes(&self.public_key);
        w.put_u8(0);
    }

    /// Decode an identity.
    ///
    /// # Errors
    ///
    /// `WireError::Truncated` on a short buffer and
    /// `WireError::InvalidIdentity` for a nil address.
    pub fn read(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let address = PeerAddr::read(r)?;
        let key_bytes = r.read_bytes(PUBLIC_KEY_SIZE)?;
        let mut public_key = [0u8; PUBLIC_KEY_SIZE];
        public_key.copy_from_slice(key_bytes);
        let secret_len = r.read_u8()?;
        r.skip(secret_len as usize)?;
        if address.is_nil() {
            return Err(WireError::InvalidIdentity);
        }
        Ok(Self {
            address,
            public_key,
        })
    }
}

/// The local node's identity: the shared cluster identity every member
/// presents to end-peers.
///
/// Holds the private key the cluster master secret is derived from.
/// Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct LocalIdentity {
    #[zeroize(skip)]
    address: PeerAddr,
    #[zeroize(skip)]
    public_key: [u8; PUBLIC_KEY_SIZE],
    secret_key: [u8; PUBLIC_KEY_SIZE],
}

impl LocalIdentity {
    /// Assemble a local identity from its parts.
    #[must_use]
    pub fn new(
        address: PeerAddr,
        public_key: [u8; PUBLIC_KEY_SIZE],
        secret_key: [u8; PUBLIC_KEY_SIZE],
    ) -> Self {
        Self {
            address,
            public_key,
            secret_key,
        }
    }

    /// The identity's 40-bit address.
    #[must_use]
    pub fn address(&self) -> PeerAddr {
        self.address
    }

    /// The public half as a [`PeerIdentity`].
    #[must_use]
    pub fn to_peer_identity(&self) -> PeerIdentity {
        PeerIdentity::new(self.address, self.public_key)
    }

    /// Derive the cluster master secret from the private key.
    #[must_use]
    pub fn master_secret(&self) -> MasterSecret {
        MasterSecret::from_identity_secret(&self.secret_key)
    }
}
