//! Stream declarations and per-stream demuxing state

use super::index::IndexEntries;
use super::splitter::Splitter;
use super::Packet;
use crate::codec::{CodecId, CodecParameters};
use crate::util::{MediaType, Rational, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Deepest decode/presentation reordering the timestamp window tracks
pub const MAX_REORDER_DELAY: usize = 16;

/// How much bitstream parsing a stream's packets need
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeedParsing {
    /// Packets are complete frames with usable timestamps
    #[default]
    None,
    /// Packets are arbitrary slices of the bitstream
    Full,
    /// Packets are complete frames; the parser only reads headers
    Headers,
    /// The parser only interpolates timestamps by byte offset
    Timestamps,
    /// Parse the first frame fully, then pass data through
    FullOnce,
}

/// Which packets of a stream may be dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Discard {
    None,
    /// Drop useless packets such as empty ones
    #[default]
    Default,
    NonRef,
    Bidir,
    NonKey,
    All,
}

/// Stream disposition flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Disposition {
    pub default: bool,
    /// The stream is a single cover picture rather than a media track
    pub attached_pic: bool,
    pub hearing_impaired: bool,
    pub visual_impaired: bool,
}

/// A stream as declared by a container reader
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub codec: CodecParameters,

    /// Time base for this stream
    pub time_base: Rational,

    /// Bits before timestamps wrap around
    pub wrap_bits: u32,

    /// First presentation time in time_base units
    pub start_time: Timestamp,

    /// Duration in time_base units
    pub duration: Timestamp,

    /// Number of frames, 0 if unknown
    pub nb_frames: u64,

    /// Average frame rate, 0/1 if unknown
    pub avg_frame_rate: Rational,

    /// Lowest rate all timestamps can be represented in, 0/1 if unknown
    pub r_frame_rate: Rational,

    pub disposition: Disposition,
    pub need_parsing: NeedParsing,
    pub discard: Discard,

    /// Stream metadata
    pub metadata: HashMap<String, String>,

    /// Cover picture delivered as the stream's only packet
    pub attached_pic: Option<Packet>,
}

impl StreamInfo {
    /// Declare a stream with the given codec parameters
    pub fn new(codec: CodecParameters) -> Self {
        StreamInfo {
            codec,
            time_base: Rational::new(1, 90000),
            wrap_bits: 33,
            start_time: Timestamp::none(),
            duration: Timestamp::none(),
            nb_frames: 0,
            avg_frame_rate: Rational::default(),
            r_frame_rate: Rational::default(),
            disposition: Disposition::default(),
            need_parsing: NeedParsing::None,
            discard: Discard::Default,
            metadata: HashMap::new(),
            attached_pic: None,
        }
    }

    pub fn with_time_base(mut self, time_base: Rational) -> Self {
        self.time_base = time_base;
        self
    }

    pub fn with_wrap_bits(mut self, wrap_bits: u32) -> Self {
        self.wrap_bits = wrap_bits;
        self
    }

    pub fn with_need_parsing(mut self, need_parsing: NeedParsing) -> Self {
        self.need_parsing = need_parsing;
        self
    }

    pub fn with_frame_rate(mut self, rate: Rational) -> Self {
        self.avg_frame_rate = rate;
        self
    }

    pub fn with_start_time(mut self, start_time: i64) -> Self {
        self.start_time = Timestamp::new(start_time);
        self
    }

    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = Timestamp::new(duration);
        self
    }

    pub fn with_discard(mut self, discard: Discard) -> Self {
        self.discard = discard;
        self
    }

    pub fn with_disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = disposition;
        self
    }

    /// Mark the stream as a cover picture carried by `picture`
    pub fn with_attached_pic(mut self, mut picture: Packet) -> Self {
        picture.set_keyframe(true);
        self.disposition.attached_pic = true;
        self.attached_pic = Some(picture);
        self
    }

    pub fn media_type(&self) -> MediaType {
        self.codec.media_type
    }

    /// Get duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.duration.to_seconds(self.time_base)
    }
}

/// One elementary stream of an open session, with its reconciliation state
pub struct Stream {
    /// Position of the stream in the session
    pub index: usize,

    /// What the reader declared, refined by inference
    pub info: StreamInfo,

    /// Expected dts of the next packet
    pub cur_dts: Timestamp,

    /// Offset of the stream's timestamp origin, fixed once known
    pub first_dts: Timestamp,

    /// Pts of the last displayed I or P frame
    pub last_ip_pts: Timestamp,
    pub last_ip_duration: i64,

    /// Reference for parser-signalled dts deltas
    pub reference_dts: Timestamp,

    /// Recent pts values, ascending
    pub pts_buffer: [Timestamp; MAX_REORDER_DELAY + 1],

    pub index_entries: IndexEntries,

    pub(crate) parser: Option<Splitter>,

    /// Packets a `Probe` stream may still buffer before its codec is forced
    pub probe_packets: u32,
    pub(crate) probe_data: Vec<u8>,

    /// Packets seen during stream-info inference
    pub codec_info_nb_frames: u64,
}

impl Stream {
    pub fn new(index: usize, info: StreamInfo, max_probe_packets: u32) -> Self {
        Stream {
            index,
            info,
            cur_dts: Timestamp::new(0),
            first_dts: Timestamp::none(),
            last_ip_pts: Timestamp::none(),
            last_ip_duration: 0,
            reference_dts: Timestamp::none(),
            pts_buffer: [Timestamp::none(); MAX_REORDER_DELAY + 1],
            index_entries: IndexEntries::new(),
            parser: None,
            probe_packets: max_probe_packets,
            probe_data: Vec::new(),
            codec_info_nb_frames: 0,
        }
    }

    pub fn codec(&self) -> &CodecParameters {
        &self.info.codec
    }

    pub fn codec_mut(&mut self) -> &mut CodecParameters {
        &mut self.info.codec
    }

    pub fn media_type(&self) -> MediaType {
        self.info.codec.media_type
    }

    pub fn time_base(&self) -> Rational {
        self.info.time_base
    }

    /// Whether the stream's codec is still to be sniffed from its payload
    pub fn is_probing(&self) -> bool {
        self.info.codec.codec_id == CodecId::Probe
    }

    /// Whether a bitstream parser is currently attached
    pub fn has_parser(&self) -> bool {
        self.parser.is_some()
    }

    /// Close and detach the parser
    pub(crate) fn close_parser(&mut self) {
        if let Some(parser) = self.parser.take() {
            parser.close();
        }
    }

    /// Forget all in-flight reconciliation state after a seek
    pub(crate) fn reset_read_state(&mut self, max_probe_packets: u32) {
        self.close_parser();
        self.last_ip_pts = Timestamp::none();
        self.cur_dts = Timestamp::none();
        self.reference_dts = Timestamp::none();
        self.probe_packets = max_probe_packets;
        self.pts_buffer = [Timestamp::none(); MAX_REORDER_DELAY + 1];
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("index", &self.index)
            .field("codec", &self.info.codec.codec_id)
            .field("time_base", &self.info.time_base)
            .field("cur_dts", &self.cur_dts)
            .field("first_dts", &self.first_dts)
            .field("index_entries", &self.index_entries.len())
            .field("parser", &self.parser.is_some())
            .finish()
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codec = &self.info.codec;
        write!(f, "Stream #{}: {}: {}", self.index, codec.media_type, codec.codec_id)?;
        match codec.media_type {
            MediaType::Video if codec.width > 0 => {
                write!(f, ", {}x{}", codec.width, codec.height)?;
                if let Some(pix_fmt) = &codec.pix_fmt {
                    write!(f, ", {}", pix_fmt)?;
                }
            }
            MediaType::Audio if codec.sample_rate > 0 => {
                write!(f, ", {} Hz, {} channels", codec.sample_rate, codec.channels)?;
            }
            _ => {}
        }
        if self.info.avg_frame_rate.num > 0 {
            write!(f, ", {:.2} fps", self.info.avg_frame_rate.to_f64())?;
        }
        if self.info.disposition.attached_pic {
            write!(f, " (attached pic)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::Buffer;

    #[test]
    fn test_stream_defaults() {
        let stream = Stream::new(0, StreamInfo::new(CodecParameters::new(CodecId::H264)), 2500);
        assert_eq!(stream.time_base(), Rational::new(1, 90000));
        assert_eq!(stream.info.wrap_bits, 33);
        assert_eq!(stream.cur_dts, Timestamp::new(0));
        assert!(stream.first_dts.is_none());
        assert!(stream.pts_buffer.iter().all(|ts| ts.is_none()));
        assert_eq!(stream.probe_packets, 2500);
    }

    #[test]
    fn test_reset_read_state() {
        let mut stream = Stream::new(1, StreamInfo::new(CodecParameters::new(CodecId::Mp3)), 10);
        stream.cur_dts = Timestamp::new(900);
        stream.first_dts = Timestamp::new(0);
        stream.last_ip_pts = Timestamp::new(870);
        stream.pts_buffer[0] = Timestamp::new(5);
        stream.probe_packets = 0;

        stream.reset_read_state(10);
        assert!(stream.cur_dts.is_none());
        assert!(stream.last_ip_pts.is_none());
        assert!(stream.pts_buffer[0].is_none());
        assert_eq!(stream.probe_packets, 10);
        // the origin survives seeking
        assert_eq!(stream.first_dts, Timestamp::new(0));
    }

    #[test]
    fn test_attached_pic_declaration() {
        let cover = Packet::new(0, Buffer::from_vec(vec![0xff, 0xd8]));
        let info = StreamInfo::new(CodecParameters::new(CodecId::Mjpeg)).with_attached_pic(cover);
        assert!(info.disposition.attached_pic);
        assert!(info.attached_pic.as_ref().unwrap().is_keyframe());
    }

    #[test]
    fn test_discard_ordering() {
        assert!(Discard::Default < Discard::All);
        assert!(Discard::NonKey < Discard::All);
        assert!(Discard::None < Discard::Default);
    }
}
