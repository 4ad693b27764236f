//! Stream-info inference results
//!
//! A serializable snapshot of what [`find_stream_info`] learned, in the
//! spirit of an ffprobe dump.
//!
//! [`find_stream_info`]: crate::format::DemuxerContext::find_stream_info

use super::has_codec_parameters;
use crate::format::DemuxerContext;
use crate::util::{MediaType, Rational, TIME_BASE_US};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Input-level summary after stream-info inference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamInfoReport {
    pub file_path: String,
    /// Container format name
    pub format: String,
    pub format_long_name: String,
    /// File size in bytes, if known
    pub file_size: Option<u64>,
    /// Start time in seconds
    pub start_time: Option<f64>,
    /// Total duration in seconds
    pub duration: Option<f64>,
    /// Overall bitrate in bits/second
    pub bitrate: Option<i64>,
    pub streams: Vec<StreamSummary>,
    /// Packets read ahead and held for the caller
    pub buffered_packets: usize,
}

/// One stream's inferred parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSummary {
    pub index: usize,
    pub media_type: MediaType,
    pub codec: String,
    pub codec_long_name: String,
    pub time_base: Rational,
    /// Average frame rate, video only
    pub avg_frame_rate: Option<Rational>,
    /// Real base frame rate, video only
    pub r_frame_rate: Option<Rational>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub pixel_format: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub sample_format: Option<String>,
    pub bits_per_coded_sample: Option<u32>,
    pub extradata_size: usize,
    /// Start time in seconds
    pub start_time: Option<f64>,
    /// Duration in seconds
    pub duration: Option<f64>,
    /// Packets inspected while inferring
    pub frames_analyzed: u64,
    /// Every parameter needed for decoding is known
    pub complete: bool,
}

fn seconds(us: Option<i64>) -> Option<f64> {
    us.map(|v| v as f64 / TIME_BASE_US as f64)
}

fn nonzero<T: Default + PartialEq>(v: T) -> Option<T> {
    (v != T::default()).then_some(v)
}

impl StreamInfoReport {
    /// Snapshot the current state of `ctx`
    pub fn from_context(ctx: &DemuxerContext) -> Self {
        let streams = ctx
            .streams()
            .iter()
            .map(|st| {
                let codec = &st.info.codec;
                let tb = st.time_base();
                let is_video = codec.media_type == MediaType::Video;
                let rate = |r: Rational| (is_video && !r.is_zero()).then_some(r);
                StreamSummary {
                    index: st.index,
                    media_type: codec.media_type,
                    codec: codec.codec_id.name().to_string(),
                    codec_long_name: codec.codec_id.info().long_name.to_string(),
                    time_base: tb,
                    avg_frame_rate: rate(st.info.avg_frame_rate),
                    r_frame_rate: rate(st.info.r_frame_rate),
                    width: nonzero(codec.width),
                    height: nonzero(codec.height),
                    pixel_format: codec.pix_fmt.clone(),
                    sample_rate: nonzero(codec.sample_rate),
                    channels: nonzero(codec.channels),
                    sample_format: codec.sample_fmt.clone(),
                    bits_per_coded_sample: nonzero(codec.bits_per_coded_sample),
                    extradata_size: codec.extradata.as_ref().map_or(0, |e| e.len()),
                    start_time: st.info.start_time.get().map(|v| v as f64 * tb.to_f64()),
                    duration: st.info.duration.get().map(|v| v as f64 * tb.to_f64()),
                    frames_analyzed: st.codec_info_nb_frames,
                    complete: has_codec_parameters(codec, false),
                }
            })
            .collect();

        let info = ctx.format_info();
        StreamInfoReport {
            file_path: ctx.filename().to_string(),
            format: info.name.clone(),
            format_long_name: info.long_name.clone(),
            file_size: ctx.file_size(),
            start_time: seconds(ctx.start_time().get()),
            duration: seconds(ctx.duration().get()),
            bitrate: nonzero(ctx.bit_rate()),
            streams,
            buffered_packets: ctx.buffered_packets(),
        }
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> crate::error::Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| crate::error::Error::InvalidData(format!("JSON serialization failed: {}", e)))
    }

    /// Convert to compact JSON string
    pub fn to_json_compact(&self) -> crate::error::Result<String> {
        serde_json::to_string(self)
            .map_err(|e| crate::error::Error::InvalidData(format!("JSON serialization failed: {}", e)))
    }

    /// Summary of the first stream of `media_type`
    pub fn first_of(&self, media_type: MediaType) -> Option<&StreamSummary> {
        self.streams.iter().find(|s| s.media_type == media_type)
    }
}

impl fmt::Display for StreamInfoReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Input #0, {} from '{}':", self.format, self.file_path)?;
        if let Some(size) = self.file_size {
            writeln!(f, "  File Size: {} bytes ({:.2} MB)", size, size as f64 / 1_048_576.0)?;
        }

        if let Some(duration) = self.duration {
            let hours = (duration / 3600.0) as u32;
            let minutes = ((duration % 3600.0) / 60.0) as u32;
            let seconds = duration % 60.0;
            write!(f, "  Duration: {:02}:{:02}:{:05.2}", hours, minutes, seconds)?;
            if let Some(start) = self.start_time {
                write!(f, ", start: {:.6}", start)?;
            }
            writeln!(f)?;
        }

        if let Some(bitrate) = self.bitrate {
            writeln!(f, "  Bitrate: {:.2} kbps", bitrate as f64 / 1000.0)?;
        }

        for stream in &self.streams {
            writeln!(f, "  Stream #{}: {}", stream.index, stream)?;
        }
        Ok(())
    }
}

impl fmt::Display for StreamSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.media_type, self.codec_long_name, self.codec)?;

        if let (Some(width), Some(height)) = (self.width, self.height) {
            write!(f, ", {}x{}", width, height)?;
        }
        if let Some(ref pix_fmt) = self.pixel_format {
            write!(f, ", {}", pix_fmt)?;
        }
        if let Some(fps) = self.avg_frame_rate {
            write!(f, ", {:.2} fps", fps.to_f64())?;
        }
        if let Some(rate) = self.r_frame_rate {
            write!(f, ", {} tbr", rate)?;
        }

        if let Some(rate) = self.sample_rate {
            write!(f, ", {} Hz", rate)?;
        }
        if let Some(channels) = self.channels {
            write!(f, ", {} channels", channels)?;
        }
        if let Some(ref fmt) = self.sample_format {
            write!(f, ", {}", fmt)?;
        }

        if !self.complete {
            write!(f, " (incomplete)")?;
        }
        Ok(())
    }
}
