//! Container demuxing
//!
//! This module turns the raw packets of a container reader into a clean,
//! timestamped packet stream. The pieces, in pipeline order:
//!
//! - [`Demuxer`] / [`InputFormat`]: external container readers and their factories
//! - [`PacketQueue`]: buffering between stages
//! - [`Splitter`]: bitstream parsing of raw payloads into frames
//! - [`TimestampReconciler`]: fills in missing pts, dts and durations
//! - [`IndexEntries`] and the [`seek`] helpers: seeking by index or timestamp search
//! - [`DemuxerContext`]: the session tying them together

pub mod context;
pub mod demuxer;
pub mod index;
pub mod io;
pub mod options;
pub mod packet;
pub mod queue;
pub mod registry;
pub mod seek;
pub mod splitter;
pub mod stream;
pub mod timestamps;

pub use context::{DemuxerContext, InterruptCallback};
pub use demuxer::{DemuxHeader, Demuxer};
pub use index::{IndexEntries, IndexEntry};
pub use io::{MediaSource, ProbeReplay, Streaming};
pub use options::{DemuxFlags, DemuxOptions};
pub use packet::{Packet, PacketFlags};
pub use queue::PacketQueue;
pub use registry::FormatRegistry;
pub use seek::{SearchBounds, SeekFlags};
pub use splitter::{SplitFrame, Splitter};
pub use stream::{Discard, Disposition, NeedParsing, Stream, StreamInfo};
pub use timestamps::{FrameHints, TimestampReconciler};

use crate::codec::CodecId;
use crate::probe::ProbeData;
use std::fmt;

/// Format capability flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormatFlags {
    /// The format reads from something other than a byte stream
    pub no_file: bool,
    /// Streams may appear after the header has been read
    pub no_header: bool,
    /// Build a seek index from keyframes as packets are read
    pub generic_index: bool,
    /// Byte seeking is not possible
    pub no_byte_seek: bool,
    /// Timestamp search over byte positions is not possible
    pub no_bin_search: bool,
    /// Seeking by reading forward to fill the index is not possible
    pub no_gen_search: bool,
}

/// Container format information
#[derive(Debug, Clone)]
pub struct FormatInfo {
    /// Format name (e.g., "mp4", "mkv", "avi")
    pub name: String,
    /// Long/descriptive name
    pub long_name: String,
    /// File extensions (e.g., ["mp4", "m4v"])
    pub extensions: Vec<String>,
    /// MIME types
    pub mime_types: Vec<String>,
    pub flags: FormatFlags,
    /// Codec of the single stream, for raw elementary-stream formats
    pub elementary_codec: Option<CodecId>,
}

impl FormatInfo {
    pub fn new(name: impl Into<String>, long_name: impl Into<String>) -> Self {
        FormatInfo {
            name: name.into(),
            long_name: long_name.into(),
            extensions: Vec::new(),
            mime_types: Vec::new(),
            flags: FormatFlags::default(),
            elementary_codec: None,
        }
    }

    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = extensions.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn with_mime_types(mut self, mime_types: &[&str]) -> Self {
        self.mime_types = mime_types.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_flags(mut self, flags: FormatFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Mark the format as a raw elementary stream of `codec`
    pub fn with_elementary_codec(mut self, codec: CodecId) -> Self {
        self.elementary_codec = Some(codec);
        self
    }

    /// Whether `filename` ends in one of the format's extensions
    pub fn match_extension(&self, filename: &str) -> bool {
        let Some((_, ext)) = filename.rsplit_once('.') else {
            return false;
        };
        if ext.is_empty() || ext.contains('/') {
            return false;
        }
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}

/// A container format that can be probed and opened
pub trait InputFormat: Send + Sync {
    fn info(&self) -> &FormatInfo;

    /// Score how likely `data` is in this format, up to
    /// [`PROBE_SCORE_MAX`](crate::probe::PROBE_SCORE_MAX).
    ///
    /// `None` means the format cannot be recognized by content; it is then
    /// matched on filename extension alone.
    fn probe(&self, _data: &ProbeData) -> Option<u32> {
        None
    }

    /// Create a fresh reader instance
    fn create(&self) -> Box<dyn crate::format::Demuxer>;
}

impl fmt::Debug for dyn InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InputFormat").field(&self.info().name).finish()
    }
}
