//! Packet representation for compressed media data

use crate::util::{Buffer, Timestamp};
use std::fmt;

/// Packet flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketFlags {
    /// Packet contains a keyframe
    pub keyframe: bool,
    /// Packet is corrupted
    pub corrupt: bool,
}

/// A packet of compressed media data
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Stream index this packet belongs to
    pub stream_index: usize,

    /// Compressed data
    pub data: Buffer,

    /// Presentation timestamp
    pub pts: Timestamp,

    /// Decoding timestamp
    pub dts: Timestamp,

    /// Duration in stream time base units, 0 if unknown
    pub duration: i64,

    /// Packet flags
    pub flags: PacketFlags,

    /// Byte position in stream (-1 if unknown)
    pub position: i64,
}

impl Packet {
    /// Create a new packet
    pub fn new(stream_index: usize, data: Buffer) -> Self {
        Packet {
            stream_index,
            data,
            pts: Timestamp::none(),
            dts: Timestamp::none(),
            duration: 0,
            flags: PacketFlags::default(),
            position: -1,
        }
    }

    /// Set both timestamps
    pub fn with_timestamps(mut self, pts: impl Into<Timestamp>, dts: impl Into<Timestamp>) -> Self {
        self.pts = pts.into();
        self.dts = dts.into();
        self
    }

    /// Set the byte position
    pub fn with_position(mut self, position: i64) -> Self {
        self.position = position;
        self
    }

    /// Set the duration
    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = duration;
        self
    }

    /// Set the keyframe flag
    pub fn with_keyframe(mut self, keyframe: bool) -> Self {
        self.flags.keyframe = keyframe;
        self
    }

    /// Check if this packet is a keyframe
    pub fn is_keyframe(&self) -> bool {
        self.flags.keyframe
    }

    /// Set keyframe flag
    pub fn set_keyframe(&mut self, keyframe: bool) {
        self.flags.keyframe = keyframe;
    }

    /// Get the size of the packet data
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Packet(stream={}, size={}, pts={}, dts={}, dur={}, pos={}, key={})",
            self.stream_index,
            self.size(),
            self.pts,
            self.dts,
            self.duration,
            self.position,
            self.is_keyframe()
        )
    }
}
