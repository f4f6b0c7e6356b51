//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Frame below the minimum sealed length
    #[error("frame too short: expected at least {expected}, got {actual}")]
    FrameTooShort {
        /// Expected minimum size
        expected: usize,
        /// Actual size received
        actual: usize,
    },

    /// Frame above the maximum sealed length
    #[error("frame too long: limit {limit}, got {actual}")]
    FrameTooLong {
        /// Maximum accepted size
        limit: usize,
        /// Actual size received
        actual: usize,
    },

    /// Truncated tag did not match (authentication failure)
    #[error("frame authentication failed")]
    AuthenticationFailed,

    /// Random number generation failed
    #[error("random number generation failed")]
    RandomFailed,
}
