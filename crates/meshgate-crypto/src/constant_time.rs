//! Constant-time comparisons.
//!
//! Tag verification must not leak how many leading bytes matched, so all
//! comparisons here are constant-time with respect to content.

use subtle::ConstantTimeEq;

/// Constant-time comparison of byte slices.
///
/// Returns `true` if slices are equal, `false` otherwise.
/// Execution time depends only on slice length, not content.
#[must_use]
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.ct_eq(b).into()
}

/// Timing-safe 8-byte comparison, sized for the truncated frame tag.
#[must_use]
#[inline(never)]
pub fn verify_8(a: &[u8], b: &[u8]) -> bool {
    a.len() == 8 && b.len() == 8 && ct_eq(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ct_eq_same() {
        let a = [1u8; 32];
        let b = [1u8; 32];
        assert!(ct_eq(&a, &b));
    }

    #[test]
    fn test_ct_eq_different() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        assert!(!ct_eq(&a, &b));
    }

    #[test]
    fn test_ct_eq_different_lengths() {
        let a = [1u8; 32];
        let b = [1u8; 16];
        assert!(!ct_eq(&a, &b));
    }

    #[test]
    fn test_verify_8() {
        let a = [0x42u8; 8];
        let b = [0x42u8; 8];
        let c = [0x43u8; 8];

        assert!(verify_8(&a, &b));
        assert!(!verify_8(&a, &c));
        assert!(!verify_8(&a, &[0x42u8; 7]));
    }
}
