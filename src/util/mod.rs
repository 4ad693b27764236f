//! Common utilities and data structures

pub mod buffer;
pub mod rational;
pub mod timestamp;

pub use buffer::Buffer;
pub use rational::{
    compare_mod, gcd, rescale, rescale_q, rescale_q_rnd, rescale_rnd, Rational, Rounding,
    TIME_BASE_US,
};
pub use timestamp::{TimeBase, Timestamp, NOPTS_VALUE};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Common media types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Video stream
    Video,
    /// Audio stream
    Audio,
    /// Subtitle stream
    Subtitle,
    /// Data stream
    Data,
    /// Unknown stream type
    Unknown,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaType::Video => write!(f, "video"),
            MediaType::Audio => write!(f, "audio"),
            MediaType::Subtitle => write!(f, "subtitle"),
            MediaType::Data => write!(f, "data"),
            MediaType::Unknown => write!(f, "unknown"),
        }
    }
}
