//! Codec-facing interfaces used by the demuxing core
//!
//! The core never decodes media itself. It identifies codecs, carries their
//! parameters, and drives two kinds of external collaborators:
//!
//! - [`BitstreamParser`]: slices raw container payloads into coded frames
//! - [`Decoder`]: trial-decodes packets so missing parameters get filled in
//!
//! Both are looked up through an explicit [`CodecRegistry`].

pub mod decoder;
pub mod parser;
pub mod registry;

pub use decoder::{DecodeStatus, Decoder, DecoderCapabilities, DecoderOptions};
pub use parser::{BitstreamParser, DtsSync, FramePayload, ParseOutput, ParsedFrame, ParserFlags, PictureType};
pub use registry::CodecRegistry;

use crate::util::{MediaType, Rational};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Codec identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecId {
    /// No codec
    None,
    /// Codec not known yet; the stream payload is sniffed on the fly
    Probe,

    // Video
    H264,
    Hevc,
    Mpeg2Video,
    Mpeg4,
    H263,
    Flv1,
    Dirac,
    Dnxhd,
    Mjpeg,
    Bmp,
    RawVideo,
    Cdxl,
    BinkVideo,
    Vp8,
    Av1,

    // Audio
    Aac,
    Ac3,
    Eac3,
    Dts,
    Mp2,
    Mp3,
    Flac,
    Vorbis,
    Opus,
    G722,
    AdpcmImaApc,
    PcmU8,
    PcmS16Le,
    PcmS16Be,
    PcmS24Le,
    PcmF32Le,

    // Subtitle
    Text,
    Subrip,

    // Data
    BinData,
}

/// Static codec description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecInfo {
    /// Short codec name
    pub name: &'static str,
    /// Long descriptive name
    pub long_name: &'static str,
    /// Media type
    pub media_type: MediaType,
    /// Every frame is independently decodable
    pub intra_only: bool,
}

impl CodecId {
    /// Static description of this codec
    pub fn info(self) -> CodecInfo {
        use MediaType::*;
        let (name, long_name, media_type, intra_only) = match self {
            CodecId::None => ("none", "no codec", Unknown, false),
            CodecId::Probe => ("probe", "codec to be detected", Unknown, false),
            CodecId::H264 => ("h264", "H.264 / AVC / MPEG-4 AVC / MPEG-4 part 10", Video, false),
            CodecId::Hevc => ("hevc", "H.265 / HEVC", Video, false),
            CodecId::Mpeg2Video => ("mpeg2video", "MPEG-2 video", Video, false),
            CodecId::Mpeg4 => ("mpeg4", "MPEG-4 part 2", Video, false),
            CodecId::H263 => ("h263", "H.263", Video, false),
            CodecId::Flv1 => ("flv1", "FLV / Sorenson Spark", Video, false),
            CodecId::Dirac => ("dirac", "Dirac", Video, false),
            CodecId::Dnxhd => ("dnxhd", "VC3 / DNxHD", Video, true),
            CodecId::Mjpeg => ("mjpeg", "Motion JPEG", Video, true),
            CodecId::Bmp => ("bmp", "BMP image", Video, true),
            CodecId::RawVideo => ("rawvideo", "raw video", Video, true),
            CodecId::Cdxl => ("cdxl", "Commodore CDXL video", Video, true),
            CodecId::BinkVideo => ("binkvideo", "Bink video", Video, false),
            CodecId::Vp8 => ("vp8", "On2 VP8", Video, false),
            CodecId::Av1 => ("av1", "Alliance for Open Media AV1", Video, false),
            CodecId::Aac => ("aac", "AAC (Advanced Audio Coding)", Audio, true),
            CodecId::Ac3 => ("ac3", "ATSC A/52A (AC-3)", Audio, true),
            CodecId::Eac3 => ("eac3", "ATSC A/52B (E-AC-3)", Audio, true),
            CodecId::Dts => ("dts", "DCA (DTS Coherent Acoustics)", Audio, true),
            CodecId::Mp2 => ("mp2", "MP2 (MPEG audio layer 2)", Audio, true),
            CodecId::Mp3 => ("mp3", "MP3 (MPEG audio layer 3)", Audio, true),
            CodecId::Flac => ("flac", "FLAC (Free Lossless Audio Codec)", Audio, true),
            CodecId::Vorbis => ("vorbis", "Vorbis", Audio, true),
            CodecId::Opus => ("opus", "Opus", Audio, true),
            CodecId::G722 => ("g722", "G.722 ADPCM", Audio, true),
            CodecId::AdpcmImaApc => ("adpcm_ima_apc", "ADPCM IMA CRYO APC", Audio, true),
            CodecId::PcmU8 => ("pcm_u8", "PCM unsigned 8-bit", Audio, true),
            CodecId::PcmS16Le => ("pcm_s16le", "PCM signed 16-bit little-endian", Audio, true),
            CodecId::PcmS16Be => ("pcm_s16be", "PCM signed 16-bit big-endian", Audio, true),
            CodecId::PcmS24Le => ("pcm_s24le", "PCM signed 24-bit little-endian", Audio, true),
            CodecId::PcmF32Le => ("pcm_f32le", "PCM 32-bit floating point little-endian", Audio, true),
            CodecId::Text => ("text", "raw UTF-8 text", Subtitle, true),
            CodecId::Subrip => ("subrip", "SubRip subtitle", Subtitle, true),
            CodecId::BinData => ("bin_data", "binary data", Data, false),
        };
        CodecInfo {
            name,
            long_name,
            media_type,
            intra_only,
        }
    }

    /// Short codec name
    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Media type implied by the codec
    pub fn media_type(self) -> MediaType {
        self.info().media_type
    }

    /// Whether every packet of this codec can be flagged as a keyframe
    pub fn is_intra_only(self) -> bool {
        self.info().intra_only
    }

    /// Bits per coded sample for constant-rate audio codecs, 0 otherwise
    pub fn bits_per_sample(self) -> u32 {
        match self {
            CodecId::PcmU8 => 8,
            CodecId::PcmS16Le | CodecId::PcmS16Be => 16,
            CodecId::PcmS24Le => 24,
            CodecId::PcmF32Le => 32,
            CodecId::G722 | CodecId::AdpcmImaApc => 4,
            _ => 0,
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Parameters of one elementary stream's codec.
///
/// Filled partly by the container reader and completed by parsers and trial
/// decoders during stream-info inference.
#[derive(Debug, Clone, PartialEq)]
pub struct CodecParameters {
    pub codec_id: CodecId,
    pub media_type: MediaType,
    /// Bits per second, 0 if unknown
    pub bit_rate: i64,
    pub extradata: Option<Vec<u8>>,
    /// Codec time base (1/fps for fixed-rate video), 0/1 if unknown
    pub time_base: Rational,
    pub ticks_per_frame: i32,
    /// Number of frames the decoder delays output by (reordering depth)
    pub has_b_frames: u32,

    // Video
    pub width: u32,
    pub height: u32,
    pub pix_fmt: Option<String>,

    // Audio
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_fmt: Option<String>,
    /// Samples per frame for fixed-size audio frames, 0 if variable
    pub frame_size: u32,
    pub bits_per_coded_sample: u32,
}

impl CodecParameters {
    /// Parameters for a codec whose media type follows from its id
    pub fn new(codec_id: CodecId) -> Self {
        Self::with_media_type(codec_id, codec_id.media_type())
    }

    /// Parameters with an explicit media type (needed for [`CodecId::Probe`])
    pub fn with_media_type(codec_id: CodecId, media_type: MediaType) -> Self {
        CodecParameters {
            codec_id,
            media_type,
            bit_rate: 0,
            extradata: None,
            time_base: Rational::default(),
            ticks_per_frame: 1,
            has_b_frames: 0,
            width: 0,
            height: 0,
            pix_fmt: None,
            sample_rate: 0,
            channels: 0,
            sample_fmt: None,
            frame_size: 0,
            bits_per_coded_sample: 0,
        }
    }

    /// Number of audio samples carried by a packet of `size` bytes, if derivable
    pub fn audio_frame_samples(&self, size: usize) -> Option<u32> {
        if self.frame_size > 1 {
            return Some(self.frame_size);
        }
        let bits = self.codec_id.bits_per_sample();
        if bits == 0 || self.channels == 0 || size == 0 {
            return None;
        }
        let samples = (size as u64 * 8) / (bits as u64 * self.channels as u64);
        (samples > 0).then_some(samples as u32)
    }

    /// Whether the codec time base is too coarse or too fine to trust as a frame rate.
    ///
    /// Such streams need their frame rate measured from packet timestamps.
    pub fn time_base_unreliable(&self) -> bool {
        let tb = self.time_base;
        tb.den >= 101 * tb.num
            || tb.den < 5 * tb.num
            || matches!(self.codec_id, CodecId::Mpeg2Video | CodecId::H264)
    }
}
