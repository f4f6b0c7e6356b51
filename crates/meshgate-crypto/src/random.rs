//! Secure random number generation.
//!
//! All randomness comes from the operating system CSPRNG.

use crate::CryptoError;

/// Fill a buffer with random bytes from the OS CSPRNG
pub fn fill_random(buf: &mut [u8]) -> Result<(), CryptoError> {
    getrandom::fill(buf).map_err(|_| CryptoError::RandomFailed)
}

/// Generate a random 16-byte frame IV
pub fn random_16() -> Result<[u8; 16], CryptoError> {
    let mut buf = [0u8; 16];
    fill_random(&mut buf)?;
    Ok(buf)
}
