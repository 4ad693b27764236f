//! Bitstream parser interface
//!
//! A bitstream parser finds coded-frame boundaries in a raw byte stream
//! without decoding. The demuxer feeds it container payloads and receives
//! complete frames back, possibly with a delay of one call while the parser
//! looks ahead for the next frame start.

use super::CodecParameters;
use crate::error::Result;
use std::ops::Range;

/// Picture coding type reported by a parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PictureType {
    /// Unknown or not applicable
    #[default]
    None,
    /// Intra frame
    I,
    /// Predicted frame
    P,
    /// Bidirectionally predicted frame
    B,
}

/// Behavior switches the demuxer sets on a parser instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParserFlags {
    /// Input packets already hold exactly one complete frame each
    pub complete_frames: bool,
    /// Parse headers only once, then pass data through
    pub once: bool,
}

/// Timestamp synchronization info carried by some bitstreams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DtsSync {
    /// 0: not a sync point but deltas are valid; >0: sync point, becomes the new reference
    pub sync_point: i32,
    /// Offset of this frame's DTS from the reference DTS, in codec time base units
    pub dts_ref_dts_delta: i64,
    /// Offset of PTS from DTS, in codec time base units
    pub pts_dts_delta: i64,
}

/// Where the bytes of a parsed frame live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramePayload {
    /// The frame is a sub-range of the data passed to this `parse` call
    Input(Range<usize>),
    /// The frame was assembled by the parser
    Owned(Vec<u8>),
}

/// One complete coded frame found by a parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFrame {
    pub payload: FramePayload,
    /// Explicit key-frame decision; `None` defers to `pict_type`
    pub key_frame: Option<bool>,
    pub pict_type: PictureType,
    /// Extra field periods the frame is displayed for
    pub repeat_pict: i32,
    /// Frame duration in samples (audio) or codec time base ticks (video), 0 if unknown
    pub duration: i64,
    pub dts_sync: Option<DtsSync>,
}

impl ParsedFrame {
    /// A frame with no extra side information
    pub fn new(payload: FramePayload) -> Self {
        ParsedFrame {
            payload,
            key_frame: None,
            pict_type: PictureType::None,
            repeat_pict: 0,
            duration: 0,
            dts_sync: None,
        }
    }

    /// Whether the frame should carry the key-frame flag
    pub fn is_key(&self) -> bool {
        match self.key_frame {
            Some(key) => key,
            None => self.pict_type == PictureType::I,
        }
    }
}

/// Result of one `parse` call
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParseOutput {
    /// Bytes of the input consumed by this call
    pub consumed: usize,
    /// A frame completed during this call
    pub frame: Option<ParsedFrame>,
}

/// External bitstream parser backend
pub trait BitstreamParser: Send {
    /// Consume a prefix of `data` and possibly complete a frame.
    ///
    /// An empty `data` slice means end of stream: the parser should return any
    /// frame it is holding back.
    fn parse(
        &mut self,
        codec: &mut CodecParameters,
        data: &[u8],
        flags: ParserFlags,
    ) -> Result<ParseOutput>;

    /// Whether [`BitstreamParser::split`] can locate out-of-band headers
    fn can_split(&self) -> bool {
        false
    }

    /// Length of the global header at the start of `data`, 0 if none
    fn split(&self, _codec: &CodecParameters, _data: &[u8]) -> usize {
        0
    }

    /// Release parser resources
    fn close(&mut self) {}
}
