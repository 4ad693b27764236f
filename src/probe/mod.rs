//! Format probing and stream-info inference
//!
//! Two questions get answered here before any real demuxing happens:
//!
//! - **Which container is this?** [`FormatDetector`] scores an input prefix
//!   against every registered format, growing the prefix until one format wins.
//! - **What is inside each stream?** [`StreamAnalyzer`] reads packets through
//!   the full pipeline, trial-decodes where parameters are missing and measures
//!   frame rates from packet timestamps.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zvd_demux::codec::CodecRegistry;
//! use zvd_demux::format::{DemuxOptions, DemuxerContext, FormatRegistry};
//!
//! let formats = FormatRegistry::new();
//! let file = std::fs::File::open("input.zmx")?;
//! let mut ctx = DemuxerContext::open_input(
//!     Box::new(file),
//!     "input.zmx",
//!     &formats,
//!     Arc::new(CodecRegistry::new()),
//!     DemuxOptions::default(),
//! )?;
//! let report = ctx.find_stream_info()?;
//! println!("{}", report.to_json()?);
//! # Ok::<(), zvd_demux::error::Error>(())
//! ```

pub mod format_detector;
pub mod report;
pub mod stream_analyzer;
pub mod timing;

pub use format_detector::{id3v2_tag_len, FormatDetector, ProbeData, ProbeDecision, ProbedInput};
pub use report::{StreamInfoReport, StreamSummary};
pub use stream_analyzer::{get_std_framerate, has_codec_parameters, StreamAnalyzer, MAX_STD_TIMEBASES};
pub use timing::estimate_timings;

/// Highest score a format probe can return
pub const PROBE_SCORE_MAX: u32 = 100;

/// Score of a format matched by filename extension alone
pub const PROBE_SCORE_EXTENSION: u32 = 50;

/// Smallest prefix size probing starts with
pub const PROBE_BUF_MIN: usize = 2048;

/// Largest prefix size probing grows to
pub const PROBE_BUF_MAX: usize = 1 << 20;
