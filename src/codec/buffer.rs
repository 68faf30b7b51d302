//! Byte buffers as the managed runtime holds them
//!
//! Managed bytes are signed. The buffer stores them as `i8` so that the
//! normalization in `list.rs` sees exactly what the caller handed over.

use std::ops::Deref;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ByteBuffer {
    bytes: Vec<i8>,
}

impl ByteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    /// Reinterpret unsigned bytes bit for bit
    pub fn from_unsigned(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.iter().map(|&b| b as i8).collect(),
        }
    }

    pub fn to_unsigned(&self) -> Vec<u8> {
        self.bytes.iter().map(|&b| b as u8).collect()
    }

    #[inline]
    pub fn push(&mut self, byte: i8) {
        self.bytes.push(byte);
    }

    #[inline]
    pub fn as_slice(&self) -> &[i8] {
        &self.bytes
    }

    pub fn into_inner(self) -> Vec<i8> {
        self.bytes
    }
}

impl Deref for ByteBuffer {
    type Target = [i8];

    fn deref(&self) -> &[i8] {
        &self.bytes
    }
}

impl From<Vec<i8>> for ByteBuffer {
    fn from(bytes: Vec<i8>) -> Self {
        Self { bytes }
    }
}

impl From<&[i8]> for ByteBuffer {
    fn from(bytes: &[i8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }
}

impl<const N: usize> From<[i8; N]> for ByteBuffer {
    fn from(bytes: [i8; N]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }
}

impl FromIterator<i8> for ByteBuffer {
    fn from_iter<I: IntoIterator<Item = i8>>(iter: I) -> Self {
        Self {
            bytes: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsigned_reinterpretation() {
        let buffer = ByteBuffer::from_unsigned(&[0xff, 0x00, 0x7f, 0x80]);
        assert_eq!(buffer.as_slice(), &[-1, 0, 127, -128]);
        assert_eq!(buffer.to_unsigned(), vec![0xff, 0x00, 0x7f, 0x80]);
    }

    #[test]
    fn test_deref_len() {
        let buffer = ByteBuffer::from([1i8, 2, 3]);
        assert_eq!(buffer.len(), 3);
        assert!(!buffer.is_empty());
        assert!(ByteBuffer::new().is_empty());
    }
}
