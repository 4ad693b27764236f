//! Demuxing session options

use crate::codec::CodecId;
use crate::error::{Error, Result};
use crate::probe::{PROBE_BUF_MAX, PROBE_BUF_MIN};
use crate::util::{MediaType, TIME_BASE_US};
use serde::{Deserialize, Serialize};

/// Behavior flags of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DemuxFlags {
    /// Derive missing pts from the dts of later packets
    pub gen_pts: bool,
    /// Ignore container dts when pts is present
    pub ign_dts: bool,
    /// Do not fill in missing timestamps
    pub no_fill_in: bool,
    /// Never split packets with a bitstream parser
    pub no_parse: bool,
    /// Do not keep packets read during stream-info inference
    pub no_buffer: bool,
    /// Drop packets flagged as corrupt
    pub discard_corrupt: bool,
}

/// Options controlling probing, inference and buffering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemuxOptions {
    /// Bytes stream-info inference may read
    pub probe_size: u64,
    /// Largest input prefix format probing looks at
    pub format_probe_size: usize,
    /// Microseconds of dts span after which inference stops
    pub max_analyze_duration: i64,
    /// Frames needed before a frame rate is guessed; default depends on the time base
    pub fps_probe_size: Option<u32>,
    /// Bytes of index memory per stream before the index is halved
    pub max_index_size: usize,
    /// Byte budget of packets buffered while stream codecs are being probed
    pub raw_packet_buffer_size: usize,
    /// Packets a stream may buffer while its codec is being probed
    pub max_probe_packets: u32,
    pub flags: DemuxFlags,
    pub video_codec_id: Option<CodecId>,
    pub audio_codec_id: Option<CodecId>,
    pub subtitle_codec_id: Option<CodecId>,
}

impl Default for DemuxOptions {
    fn default() -> Self {
        DemuxOptions {
            probe_size: 5_000_000,
            format_probe_size: PROBE_BUF_MAX,
            max_analyze_duration: 5 * TIME_BASE_US,
            fps_probe_size: None,
            max_index_size: 1 << 20,
            raw_packet_buffer_size: 2_500_000,
            max_probe_packets: 2500,
            flags: DemuxFlags::default(),
            video_codec_id: None,
            audio_codec_id: None,
            subtitle_codec_id: None,
        }
    }
}

impl DemuxOptions {
    /// Parse options from JSON; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let options: DemuxOptions = serde_json::from_str(json)
            .map_err(|e| Error::config(format!("Failed to parse demux options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    /// Serialize options to JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::config(format!("Failed to serialize demux options: {}", e)))
    }

    /// Reject option combinations the session cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.format_probe_size != 0 && self.format_probe_size < PROBE_BUF_MIN {
            return Err(Error::config(format!(
                "format_probe_size must be 0 or at least {} bytes",
                PROBE_BUF_MIN
            )));
        }
        if self.max_analyze_duration <= 0 {
            return Err(Error::config("max_analyze_duration must be positive"));
        }
        if self.max_index_size == 0 {
            return Err(Error::config("max_index_size must be positive"));
        }
        for (media_type, codec) in [
            (MediaType::Video, self.video_codec_id),
            (MediaType::Audio, self.audio_codec_id),
            (MediaType::Subtitle, self.subtitle_codec_id),
        ] {
            if let Some(codec) = codec {
                if codec.media_type() != media_type {
                    return Err(Error::config(format!(
                        "{} is not a {} codec",
                        codec, media_type
                    )));
                }
            }
        }
        Ok(())
    }

    /// Codec forced for streams of `media_type`
    pub fn forced_codec(&self, media_type: MediaType) -> Option<CodecId> {
        match media_type {
            MediaType::Video => self.video_codec_id,
            MediaType::Audio => self.audio_codec_id,
            MediaType::Subtitle => self.subtitle_codec_id,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = DemuxOptions::default();
        assert_eq!(options.probe_size, 5_000_000);
        assert_eq!(options.format_probe_size, 1 << 20);
        assert_eq!(options.max_analyze_duration, 5_000_000);
        assert_eq!(options.raw_packet_buffer_size, 2_500_000);
        assert_eq!(options.max_probe_packets, 2500);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let options =
            DemuxOptions::from_json(r#"{ "probe_size": 4096, "flags": { "gen_pts": true } }"#)
                .unwrap();
        assert_eq!(options.probe_size, 4096);
        assert!(options.flags.gen_pts);
        assert!(!options.flags.ign_dts);
        assert_eq!(options.max_probe_packets, 2500);
    }

    #[test]
    fn test_json_roundtrip() {
        let options = DemuxOptions {
            audio_codec_id: Some(CodecId::Mp3),
            ..DemuxOptions::default()
        };
        let json = options.to_json().unwrap();
        assert!(json.contains("\"mp3\""));
        assert_eq!(DemuxOptions::from_json(&json).unwrap(), options);
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            DemuxOptions::from_json(r#"{ "format_probe_size": 100 }"#),
            Err(Error::Config(_))
        ));
        assert!(DemuxOptions::from_json("not json").is_err());

        let mismatched = DemuxOptions {
            video_codec_id: Some(CodecId::Aac),
            ..DemuxOptions::default()
        };
        assert!(mismatched.validate().is_err());
    }
}
