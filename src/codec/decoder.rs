//! Trial decoder interface
//!
//! Stream-info inference decodes a few packets of each stream whose codec
//! parameters are incomplete. Decoded output is discarded; only the side effect
//! of the decoder filling in [`CodecParameters`] matters.

use super::CodecParameters;
use crate::error::Result;

/// Options passed when opening a decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderOptions {
    /// Worker threads; inference always opens decoders single-threaded
    pub threads: usize,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        DecoderOptions { threads: 1 }
    }
}

/// Decoder capability flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecoderCapabilities {
    /// The decoder sets the channel layout itself; at least one frame must be decoded
    pub channel_conf: bool,
}

/// Outcome of one decode call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeStatus {
    /// Bytes consumed from the input
    pub consumed: usize,
    /// A frame was produced
    pub got_output: bool,
}

/// Decoder trait for trial decoding
pub trait Decoder: Send {
    /// Prepare the decoder; may already fill parameters from extradata
    fn open(&mut self, params: &mut CodecParameters, options: &DecoderOptions) -> Result<()>;

    /// Decode from `data`, updating `params` as stream properties become known.
    ///
    /// An empty `data` slice drains delayed frames.
    fn decode(&mut self, params: &mut CodecParameters, data: &[u8]) -> Result<DecodeStatus>;

    /// Capability flags
    fn capabilities(&self) -> DecoderCapabilities {
        DecoderCapabilities::default()
    }

    /// Release decoder resources
    fn close(&mut self) {}
}
