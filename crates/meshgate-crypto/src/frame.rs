//! Authenticated frame sealing and opening.
//!
//! Every member-to-member frame has the layout:
//!
//! ```text
//! [0..16)   IV (16 random bytes, first 8 also used as key tweak)
//! [16..24)  truncated Poly1305 tag (first 8 bytes of the 16-byte tag)
//! [24..)    ciphertext
//! ```
//!
//! The per-frame key is the receiver's member key with its first 8 bytes
//! XORed with IV bytes `[0..8)`; the Salsa20/12 nonce is IV bytes `[8..16)`.
//! The first 32 bytes of keystream become a one-time Poly1305 key and the
//! MAC covers the ciphertext (encrypt-then-MAC), as in NaCl `secretbox`.

use crate::constant_time;
use crate::error::CryptoError;
use crate::keys::MemberKey;
use crate::{FRAME_IV_SIZE, FRAME_OVERHEAD, FRAME_TAG_SIZE, MAX_FRAME_LENGTH};
use poly1305::Poly1305;
use poly1305::universal_hash::KeyInit;
use salsa20::Salsa12;
use salsa20::cipher::{KeyIvInit, StreamCipher};
use zeroize::Zeroize;

fn check_length(len: usize) -> Result<(), CryptoError> {
    if len < FRAME_OVERHEAD {
        return Err(CryptoError::FrameTooShort {
            expected: FRAME_OVERHEAD,
            actual: len,
        });
    }
    if len > MAX_FRAME_LENGTH {
        return Err(CryptoError::FrameTooLong {
            limit: MAX_FRAME_LENGTH,
            actual: len,
        });
    }
    Ok(())
}

/// Build the per-frame Salsa20/12 instance from a member key and frame IV.
fn frame_cipher(key: &MemberKey, iv: &[u8]) -> Salsa12 {
    let mut tweaked = *key.as_bytes();
    for (k, i) in tweaked.iter_mut().zip(&iv[..8]) {
        *k ^= *i;
    }
    let cipher = Salsa12::new(
        salsa20::Key::from_slice(&tweaked),
        salsa20::Nonce::from_slice(&iv[8..FRAME_IV_SIZE]),
    );
    tweaked.zeroize();
    cipher
}

/// Take the first 32 keystream bytes as a one-time Poly1305 key.
///
/// Advances the cipher, so payload encryption continues at keystream
/// offset 32 exactly as the NaCl construction requires.
fn one_time_poly_key(cipher: &mut Salsa12) -> [u8; 32] {
    let mut polykey = [0u8; 32];
    cipher.apply_keystream(&mut polykey);
    polykey
}

fn compute_tag(polykey: &[u8; 32], ciphertext: &[u8]) -> [u8; 16] {
    Poly1305::new(poly1305::Key::from_slice(polykey))
        .compute_unpadded(ciphertext)
        .into()
}

/// Seal a frame in place.
///
/// `frame[..16)` must already hold the random IV and `frame[16..24)` is
/// overwritten with the truncated tag. Everything from offset 24 on is
/// encrypted in place.
///
/// # Errors
///
/// Returns `CryptoError::FrameTooShort` if the buffer cannot hold the
/// 24-byte prefix, or `CryptoError::FrameTooLong` past the frame limit.
pub fn seal_in_place(key: &MemberKey, frame: &mut [u8]) -> Result<(), CryptoError> {
    check_length(frame.len())?;

    let (header, payload) = frame.split_at_mut(FRAME_OVERHEAD);
    let mut cipher = frame_cipher(key, &header[..FRAME_IV_SIZE]);
    let mut polykey = one_time_poly_key(&mut cipher);

    cipher.apply_keystream(payload);

    let tag = compute_tag(&polykey, payload);
    polykey.zeroize();
    header[FRAME_IV_SIZE..].copy_from_slice(&tag[..FRAME_TAG_SIZE]);
    Ok(())
}

/// Open a sealed frame, returning the decrypted payload.
///
/// The tag is recomputed over the ciphertext and compared in constant time
/// before anything is decrypted.
///
/// # Errors
///
/// Returns `CryptoError::FrameTooShort`/`FrameTooLong` for out-of-bounds
/// lengths and `CryptoError::AuthenticationFailed` on tag mismatch.
pub fn open(key: &MemberKey, frame: &[u8]) -> Result<Vec<u8>, CryptoError> {
    check_length(frame.len())?;

    let iv = &frame[..FRAME_IV_SIZE];
    let claimed = &frame[FRAME_IV_SIZE..FRAME_OVERHEAD];
    let ciphertext = &frame[FRAME_OVERHEAD..];

    let mut cipher = frame_cipher(key, iv);
    let mut polykey = one_time_poly_key(&mut cipher);
    let tag = compute_tag(&polykey, ciphertext);
    polykey.zeroize();

    if !constant_time::verify_8(&tag[..FRAME_TAG_SIZE], claimed) {
        return Err(CryptoError::AuthenticationFailed);
    }

    let mut plaintext = ciphertext.to_vec();
    cipher.apply_keystream(&mut plaintext);
    Ok(plaintext)
}
