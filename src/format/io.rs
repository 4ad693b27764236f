//! Byte sources a session reads from

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};

/// A readable input, seekable unless it says otherwise
pub trait MediaSource: Read + Seek + Send {
    /// Whether arbitrary seeks are possible
    fn is_seekable(&self) -> bool {
        true
    }

    /// Total size in bytes, if known
    fn byte_len(&mut self) -> Option<u64> {
        if !self.is_seekable() {
            return None;
        }
        let here = self.stream_position().ok()?;
        let end = self.seek(SeekFrom::End(0)).ok()?;
        self.seek(SeekFrom::Start(here)).ok()?;
        Some(end)
    }
}

impl<T: AsRef<[u8]> + Send> MediaSource for Cursor<T> {
    fn byte_len(&mut self) -> Option<u64> {
        Some(self.get_ref().as_ref().len() as u64)
    }
}

impl MediaSource for File {
    fn byte_len(&mut self) -> Option<u64> {
        self.metadata().ok().map(|m| m.len())
    }
}

impl MediaSource for Box<dyn MediaSource> {
    fn is_seekable(&self) -> bool {
        (**self).is_seekable()
    }

    fn byte_len(&mut self) -> Option<u64> {
        (**self).byte_len()
    }
}

fn not_seekable() -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, "source is not seekable")
}

/// A forward-only source such as a pipe or socket
pub struct Streaming<R> {
    inner: R,
    pos: u64,
}

impl<R: Read + Send> Streaming<R> {
    pub fn new(inner: R) -> Self {
        Streaming { inner, pos: 0 }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for Streaming<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R> Seek for Streaming<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Current(0) => Ok(self.pos),
            SeekFrom::Start(p) if p == self.pos => Ok(self.pos),
            _ => Err(not_seekable()),
        }
    }
}

impl<R: Read + Send> MediaSource for Streaming<R> {
    fn is_seekable(&self) -> bool {
        false
    }
}

/// Serves bytes already consumed by format probing before reading on.
///
/// Lets a forward-only source be probed and then opened from its start.
pub struct ProbeReplay {
    prefix: Vec<u8>,
    offset: usize,
    inner: Box<dyn MediaSource>,
}

impl ProbeReplay {
    /// `prefix` must be exactly the bytes read from `inner` so far
    pub fn new(prefix: Vec<u8>, inner: Box<dyn MediaSource>) -> Self {
        ProbeReplay {
            prefix,
            offset: 0,
            inner,
        }
    }

    fn position(&self) -> u64 {
        self.offset as u64
    }
}

impl Read for ProbeReplay {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.offset < self.prefix.len() {
            let n = (self.prefix.len() - self.offset).min(buf.len());
            buf[..n].copy_from_slice(&self.prefix[self.offset..self.offset + n]);
            self.offset += n;
            return Ok(n);
        }
        let n = self.inner.read(buf)?;
        self.offset += n;
        Ok(n)
    }
}

impl Seek for ProbeReplay {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::Current(delta) => self.position() as i64 + delta,
            SeekFrom::End(_) => return Err(not_seekable()),
        };
        if target == self.offset as i64 {
            return Ok(self.position());
        }
        // only positions inside the replayed prefix are reachable
        if target < 0 || self.offset > self.prefix.len() || target as usize > self.prefix.len() {
            return Err(not_seekable());
        }
        self.offset = target as usize;
        Ok(self.position())
    }
}

impl MediaSource for ProbeReplay {
    fn is_seekable(&self) -> bool {
        false
    }
}
