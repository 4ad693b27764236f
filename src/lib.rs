//! ZVD Demux - the container demultiplexing core of ZVD
//!
//! This crate turns the packets produced by container readers into a clean,
//! fully timestamped packet stream, independent of any particular container
//! or codec. Container readers, bitstream parsers and trial decoders plug in
//! through traits; this crate supplies everything in between.
//!
//! # Architecture
//!
//! - `format`: the demuxing session, packet queues, bitstream splitting,
//!   timestamp reconciliation, seek indexes and seek strategies
//! - `probe`: container format detection and stream-info inference
//! - `codec`: codec identifiers and parameters plus the parser and decoder
//!   plug-in traits
//! - `util`: rational arithmetic, timestamps and payload buffers
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zvd_demux::codec::CodecRegistry;
//! use zvd_demux::format::{DemuxOptions, DemuxerContext, FormatRegistry};
//!
//! # fn formats() -> FormatRegistry { FormatRegistry::new() }
//! let file = std::fs::File::open("input.zmx")?;
//! let mut ctx = DemuxerContext::open_input(
//!     Box::new(file),
//!     "input.zmx",
//!     &formats(),
//!     Arc::new(CodecRegistry::new()),
//!     DemuxOptions::default(),
//! )?;
//! ctx.find_stream_info()?;
//! while let Ok(packet) = ctx.read_frame() {
//!     println!("{}", packet);
//! }
//! # Ok::<(), zvd_demux::Error>(())
//! ```

pub mod codec;
pub mod error;
pub mod format;
pub mod probe;
pub mod util;

pub use error::{Error, Result};
pub use format::{DemuxOptions, DemuxerContext, FormatRegistry, Packet};

/// ZVD Demux version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 1;
pub const VERSION_PATCH: u32 = 0;

/// Library-wide configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Enable verbose logging
    pub verbose: bool,
    /// Enable debug output
    pub debug: bool,
}

/// Initialize logging according to `config`.
///
/// `RUST_LOG` style directives override the level chosen here. Fails if a
/// global subscriber is already installed.
pub fn init(config: Config) -> Result<()> {
    if config.verbose || config.debug {
        let level = if config.debug { "debug" } else { "info" };
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| Error::Init(format!("Failed to install logger: {}", e)))?;
    }

    Ok(())
}
