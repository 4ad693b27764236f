//! Container reader interface

use super::io::MediaSource;
use super::seek::SeekFlags;
use super::{Packet, StreamInfo};
use crate::error::{Error, Result};
use std::collections::HashMap;

/// What a container reader learned from the file header
#[derive(Debug, Clone, Default)]
pub struct DemuxHeader {
    /// Streams present from the start
    pub streams: Vec<StreamInfo>,
    /// Start time in microseconds, if the container declares one
    pub start_time: Option<i64>,
    /// Duration in microseconds, if the container declares one
    pub duration: Option<i64>,
    /// Total bit rate in bits per second, 0 if unknown
    pub bit_rate: i64,
    pub metadata: HashMap<String, String>,
}

impl DemuxHeader {
    pub fn new(streams: Vec<StreamInfo>) -> Self {
        DemuxHeader {
            streams,
            ..Self::default()
        }
    }

    pub fn with_duration(mut self, duration_us: i64) -> Self {
        self.duration = Some(duration_us);
        self
    }
}

/// Demuxer trait for reading container formats.
///
/// Every call receives the session's byte source; readers keep only their own
/// parsing state. Optional capabilities default to [`Error::Unsupported`] so
/// the session can fall back to its own strategies.
pub trait Demuxer: Send {
    /// Parse the file header and declare the initial streams
    fn read_header(&mut self, io: &mut dyn MediaSource) -> Result<DemuxHeader>;

    /// Read the next packet.
    ///
    /// Returns [`Error::EndOfStream`] at the end of input and
    /// [`Error::TryAgain`] when no data is available yet.
    fn read_packet(&mut self, io: &mut dyn MediaSource) -> Result<Packet>;

    /// Seek to `timestamp` (in the time base of `stream`)
    fn read_seek(
        &mut self,
        _io: &mut dyn MediaSource,
        _stream: usize,
        _timestamp: i64,
        _flags: SeekFlags,
    ) -> Result<()> {
        Err(Error::unsupported("reader has no seek"))
    }

    /// Timestamp of the first packet of `stream` at or after byte `pos`.
    ///
    /// Returns `(timestamp, packet_pos)`, or `None` if no such packet starts
    /// before `pos_limit`.
    fn read_timestamp(
        &mut self,
        _io: &mut dyn MediaSource,
        _stream: usize,
        _pos: i64,
        _pos_limit: i64,
    ) -> Result<Option<(i64, i64)>> {
        Err(Error::unsupported("reader has no timestamp probe"))
    }

    /// Streams discovered since the last call, for formats without a header
    fn new_streams(&mut self) -> Vec<StreamInfo> {
        Vec::new()
    }

    /// Close the demuxer
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
