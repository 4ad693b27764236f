//! Reference-counted payload buffers
//!
//! Packets hand their payload between queues without copying. A payload may be
//! shared by several holders; [`Buffer::make_mut`] copies it only when another
//! holder still references the same bytes.

use bytes::{Bytes, BytesMut};
use std::ops::Range;

/// A reference-counted buffer for media data
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    data: Bytes,
}

impl Buffer {
    /// Create a new buffer from bytes
    pub fn new(data: Bytes) -> Self {
        Buffer { data }
    }

    /// Create a buffer from a vector
    pub fn from_vec(vec: Vec<u8>) -> Self {
        Buffer {
            data: Bytes::from(vec),
        }
    }

    /// Create a buffer by copying a slice
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Buffer {
            data: Bytes::copy_from_slice(data),
        }
    }

    /// Create an empty buffer
    pub fn empty() -> Self {
        Buffer { data: Bytes::new() }
    }

    /// Get the length of the buffer
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get a slice of the buffer data
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Get the underlying bytes
    pub fn as_bytes(&self) -> &Bytes {
        &self.data
    }

    /// A shared view of part of this buffer; no bytes are copied
    pub fn slice(&self, range: Range<usize>) -> Buffer {
        Buffer {
            data: self.data.slice(range),
        }
    }

    /// Mutable access to the payload.
    ///
    /// Takes the bytes over in place when this is the only holder; otherwise the
    /// payload is copied first so other holders keep seeing the original data.
    pub fn make_mut<R>(&mut self, f: impl FnOnce(&mut BytesMut) -> R) -> R {
        let data = std::mem::take(&mut self.data);
        let mut owned = match data.try_into_mut() {
            Ok(unique) => unique,
            Err(shared) => BytesMut::from(&shared[..]),
        };
        let result = f(&mut owned);
        self.data = owned.freeze();
        result
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(vec: Vec<u8>) -> Self {
        Buffer::from_vec(vec)
    }
}

impl From<Bytes> for Buffer {
    fn from(data: Bytes) -> Self {
        Buffer::new(data)
    }
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_creation() {
        let buf = Buffer::from_vec(vec![1, 2, 3, 4]);
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.as_slice(), &[1, 2, 3, 4]);
        assert!(Buffer::empty().is_empty());
    }

    #[test]
    fn test_slice_shares_bytes() {
        let buf = Buffer::from_vec((0u8..10).collect());
        let part = buf.slice(2..5);
        assert_eq!(part.as_slice(), &[2, 3, 4]);
        assert_eq!(part.as_bytes().as_ptr(), buf.as_bytes()[2..].as_ptr());
    }

    #[test]
    fn test_make_mut_copies_shared_payload() {
        let original = Buffer::from_vec(vec![1, 2, 3]);
        let mut copy = original.clone();
        copy.make_mut(|data| data[0] = 9);
        assert_eq!(copy.as_slice(), &[9, 2, 3]);
        assert_eq!(original.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_make_mut_unique_payload() {
        let mut buf = Buffer::from_vec(vec![5, 6]);
        buf.make_mut(|data| data.extend_from_slice(&[7]));
        assert_eq!(buf.as_slice(), &[5, 6, 7]);
    }
}
