//! Cluster key material and per-member key derivation.
//!
//! Every cluster member shares one 64-byte master secret derived from the
//! cluster identity's private key. Each member's inbound frame key is the
//! master secret XORed with that member's big-endian 16-bit ID, hashed
//! twice with SHA-512, truncated to 32 bytes. All key material and scratch
//! buffers are zeroized.

use crate::{MASTER_SECRET_SIZE, MEMBER_KEY_SIZE};
use sha2::{Digest, Sha512};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Shared 64-byte master secret.
///
/// Never leaves this process; zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterSecret([u8; MASTER_SECRET_SIZE]);

impl MasterSecret {
    /// Wrap raw master-secret bytes.
    #[must_use]
    pub fn new(bytes: [u8; MASTER_SECRET_SIZE]) -> Self {
        Self(bytes)
    }

    /// Derive the master secret from an identity's private key material.
    #[must_use]
    pub fn from_identity_secret(secret: &[u8]) -> Self {
        let mut out = [0u8; MASTER_SECRET_SIZE];
        out.copy_from_slice(&Sha512::digest(secret));
        Self(out)
    }

    /// Raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; MASTER_SECRET_SIZE] {
        &self.0
    }
}

/// Per-member inbound frame key (32 bytes).
///
/// The key for member `m` is what every other member uses to seal frames
/// addressed to `m`, and what `m` itself uses to open them. Zeroized on
/// drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MemberKey([u8; MEMBER_KEY_SIZE]);

impl MemberKey {
    /// An all-zero placeholder for vacant member slots.
    #[must_use]
    pub fn vacant() -> Self {
        Self([0u8; MEMBER_KEY_SIZE])
    }

    /// Derive the frame key for `member_id` from the master secret.
    #[must_use]
    pub fn derive(master: &MasterSecret, member_id: u16) -> Self {
        let mut scratch = [0u8; MASTER_SECRET_SIZE];
        scratch.copy_from_slice(master.as_bytes());
        let id = member_id.to_be_bytes();
        scratch[0] ^= id[0];
        scratch[1] ^= id[1];

        let mut first = [0u8; MASTER_SECRET_SIZE];
        first.copy_from_slice(&Sha512::digest(scratch));
        scratch.zeroize();

        let mut second = [0u8; MASTER_SECRET_SIZE];
        second.copy_from_slice(&Sha512::digest(first));
        first.zeroize();

        let mut key = [0u8; MEMBER_KEY_SIZE];
        key.copy_from_slice(&second[..MEMBER_KEY_SIZE]);
        second.zeroize();

        Self(key)
    }

    /// Raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; MEMBER_KEY_SIZE] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn master() -> MasterSecret {
        MasterSecret::from_identity_secret(b"test identity secret key material")
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let a = MemberKey::derive(&master(), 7);
        let b = MemberKey::derive(&master(), 7);
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_derivation_varies_by_member() {
        let a = MemberKey::derive(&master(), 1);
        let b = MemberKey::derive(&master(), 2);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_id_bytes_are_big_endian() {
        // 0x0102 and 0x0201 tweak different master bytes
        let a = MemberKey::derive(&master(), 0x0102);
        let b = MemberKey::derive(&master(), 0x0201);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_derivation_varies_by_master() {
        let other = MasterSecret::from_identity_secret(b"another secret");
        let a = MemberKey::derive(&master(), 3);
        let b = MemberKey::derive(&other, 3);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_key_is_not_master_prefix() {
        let m = master();
        let key = MemberKey::derive(&m, 0);
        assert_ne!(key.as_bytes()[..], m.as_bytes()[..MEMBER_KEY_SIZE]);
    }
}
