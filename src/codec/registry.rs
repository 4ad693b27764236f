//! Explicit registry of parser and decoder factories

use super::{BitstreamParser, CodecId, Decoder};
use std::collections::HashMap;
use std::fmt;

type ParserFactory = Box<dyn Fn() -> Box<dyn BitstreamParser> + Send + Sync>;
type DecoderFactory = Box<dyn Fn() -> Box<dyn Decoder> + Send + Sync>;

/// Parser and decoder factories, keyed by codec
#[derive(Default)]
pub struct CodecRegistry {
    parsers: HashMap<CodecId, ParserFactory>,
    decoders: HashMap<CodecId, DecoderFactory>,
}

impl CodecRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parser for one or more codecs
    pub fn register_parser<F>(&mut self, codecs: &[CodecId], factory: F)
    where
        F: Fn() -> Box<dyn BitstreamParser> + Send + Sync + Clone + 'static,
    {
        for &codec in codecs {
            self.parsers.insert(codec, Box::new(factory.clone()));
        }
    }

    /// Register a trial decoder for a codec
    pub fn register_decoder<F>(&mut self, codec: CodecId, factory: F)
    where
        F: Fn() -> Box<dyn Decoder> + Send + Sync + 'static,
    {
        self.decoders.insert(codec, Box::new(factory));
    }

    /// Instantiate a parser for `codec`, if one is registered
    pub fn create_parser(&self, codec: CodecId) -> Option<Box<dyn BitstreamParser>> {
        self.parsers.get(&codec).map(|factory| factory())
    }

    /// Instantiate a decoder for `codec`, if one is registered
    pub fn create_decoder(&self, codec: CodecId) -> Option<Box<dyn Decoder>> {
        self.decoders.get(&codec).map(|factory| factory())
    }

    /// Whether a decoder exists for `codec`
    pub fn has_decoder(&self, codec: CodecId) -> bool {
        self.decoders.contains_key(&codec)
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parsers: Vec<_> = self.parsers.keys().map(|c| c.name()).collect();
        let mut decoders: Vec<_> = self.decoders.keys().map(|c| c.name()).collect();
        parsers.sort_unstable();
        decoders.sort_unstable();
        f.debug_struct("CodecRegistry")
            .field("parsers", &parsers)
            .field("decoders", &decoders)
            .finish()
    }
}
