//! Bounded big-endian reading and writing.
//!
//! All multi-byte integers on the cluster wire are big-endian. Every read
//! is bounds-checked and fails with [`WireError::Truncated`] instead of
//! panicking; the dispatcher turns a failed inner read into "skip this
//! sub-message" and a failed outer read into "drop the remainder of the
//! frame".

use crate::error::WireError;

/// Bounded cursor over a byte slice.
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Wrap a buffer.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// True when the cursor has reached the end.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if n > self.remaining() {
            return Err(WireError::Truncated {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Advance past `n` bytes without interpreting them.
    ///
    /// # Errors
    ///
    /// `WireError::Truncated` if fewer than `n` bytes remain.
    pub fn skip(&mut self, n: usize) -> Result<(), WireError> {
        self.take(n).map(|_| ())
    }

    /// Read `n` raw bytes.
    ///
    /// # Errors
    ///
    /// `WireError::Truncated` if fewer than `n` bytes remain.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        self.take(n)
    }

    /// Read one byte.
    ///
    /// # Errors
    ///
    /// `WireError::Truncated` at end of buffer.
    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    /// Read a big-endian `u16`.
    ///
    /// # Errors
    ///
    /// `WireError::Truncated` if fewer than 2 bytes remain.
    pub fn read_u16(&mut self) -> Result<u16, WireError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Read a big-endian `u32`.
    ///
    /// # Errors
    ///
    /// `WireError::Truncated` if fewer than 4 bytes remain.
    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a big-endian `i32`.
    ///
    /// # Errors
    ///
    /// `WireError::Truncated` if fewer than 4 bytes remain.
    pub fn read_i32(&mut self) -> Result<i32, WireError> {
        Ok(self.read_u32()? as i32)
    }

    /// Read a big-endian `u64`.
    ///
    /// # Errors
    ///
    /// `WireError::Truncated` if fewer than 8 bytes remain.
    pub fn read_u64(&mut self) -> Result<u64, WireError> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }
}

/// Append-only big-endian writer over a byte vector.
#[derive(Debug)]
pub struct Writer<'a> {
    buf: &'a mut Vec<u8>,
}

impl<'a> Writer<'a> {
    /// Wrap a vector; writes append at its end.
    #[must_use]
    pub fn new(buf: &'a mut Vec<u8>) -> Self {
        Self { buf }
    }

    /// Bytes written so far (including anything already in the vector).
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when the underlying vector is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append raw bytes.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Append one byte.
    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Append a big-endian `u16`.
    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Append a big-endian `u32`.
    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Append a big-endian `i32`.
    pub fn put_i32(&mut self, v: i32) {
        self.put_u32(v as u32);
    }

    /// Append a big-endian `u64`.
    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_roundtrip() {
        let mut buf = Vec::new();
        {
            let mut w = Writer::new(&mut buf);
            w.put_u8(0xAB);
            w.put_u16(0x1234);
            w.put_u32(0xDEAD_BEEF);
            w.put_i32(-7);
            w.put_u64(0x0102_0304_0506_0708);
            w.put_bytes(b"tail");
        }

        let mut r = Reader::new(&buf);
        assert_eq!(r.read_u8().unwrap(), 0xAB);
        assert_eq!(r.read_u16().unwrap(), 0x1234);
        assert_eq!(r.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(r.read_i32().unwrap(), -7);
        assert_eq!(r.read_u64().unwrap(), 0x0102_0304_0506_0708);
        assert_eq!(r.read_bytes(4).unwrap(), b"tail");
        assert!(r.is_empty());
    }

    #[test]
    fn test_truncated_read() {
        let mut r = Reader::new(&[0x01]);
        assert_eq!(
            r.read_u16(),
            Err(WireError::Truncated {
                needed: 2,
                remaining: 1
            })
        );
        // A failed read consumes nothing.
        assert_eq!(r.read_u8().unwrap(), 0x01);
    }

    #[test]
    fn test_skip_past_end() {
        let mut r = Reader::new(&[0u8; 4]);
        assert!(r.skip(4).is_ok());
        assert!(r.skip(1).is_err());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_reads_never_panic(
                data in prop::collection::vec(any::<u8>(), 0..256),
                ops in prop::collection::vec(0u8..6, 0..64)
            ) {
                let mut r = Reader::new(&data);
                for op in ops {
                    let _ = match op {
                        0 => r.read_u8().map(|_| ()),
                        1 => r.read_u16().map(|_| ()),
                        2 => r.read_u32().map(|_| ()),
                        3 => r.read_u64().map(|_| ()),
                        4 => r.skip(3),
                        _ => r.read_bytes(5).map(|_| ()),
                    };
                }
            }
        }
    }
}
