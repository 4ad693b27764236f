//! Error types for the demuxing core

use thiserror::Error;

/// Result type alias for demuxing operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the demuxing core
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Container format error
    #[error("Format error: {0}")]
    Format(String),

    /// Codec error (trial decoder or bitstream parser)
    #[error("Codec error: {0}")]
    Codec(String),

    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),

    /// Invalid argument supplied by the caller
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Malformed media data
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Feature the reader or format declares it lacks
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Seek target or stream could not be located
    #[error("Not found: {0}")]
    NotFound(String),

    /// End of stream
    #[error("End of stream")]
    EndOfStream,

    /// Try again later
    #[error("Try again")]
    TryAgain,

    /// Allocation failure while growing a queue or index
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    /// Pop from an empty packet queue
    #[error("Queue is empty")]
    Empty,

    /// The interrupt callback requested an abort
    #[error("Operation interrupted")]
    Interrupted,

    /// Invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a format error
    pub fn format<S: Into<String>>(msg: S) -> Self {
        Error::Format(msg.into())
    }

    /// Create a codec error
    pub fn codec<S: Into<String>>(msg: S) -> Self {
        Error::Codec(msg.into())
    }

    /// Create an unsupported error
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Error::Unsupported(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create an invalid data error
    pub fn invalid_data<S: Into<String>>(msg: S) -> Self {
        Error::InvalidData(msg.into())
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create an out of memory error
    pub fn out_of_memory<S: Into<String>>(msg: S) -> Self {
        Error::OutOfMemory(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    /// True for a graceful end of stream
    pub fn is_eof(&self) -> bool {
        matches!(self, Error::EndOfStream)
    }

    /// True for transient conditions the caller should retry
    pub fn is_retry(&self) -> bool {
        matches!(self, Error::TryAgain)
    }

    /// True when a reader or format lacks the requested capability
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::Unsupported(_))
    }

    /// Errors that must unwind the current call instead of being treated as end of input
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::OutOfMemory(_) | Error::Interrupted)
    }
}
