//! Container Format Detection
//!
//! Scores a prefix of the input against every registered format and picks the
//! single best one. Ties at the top score are not broken: the result is then
//! ambiguous and the caller has to read more data or give up.

use super::{PROBE_BUF_MAX, PROBE_BUF_MIN, PROBE_SCORE_EXTENSION, PROBE_SCORE_MAX};
use crate::codec::CodecId;
use crate::error::{Error, Result};
use crate::format::io::{MediaSource, ProbeReplay};
use crate::format::{FormatRegistry, InputFormat};
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;
use tracing::{debug, warn};

/// Score accepted for a partial prefix, and the ceiling of the fallback heuristics
const PROBE_SCORE_RETRY: u32 = PROBE_SCORE_MAX / 4;

/// Data a format's probe function looks at
#[derive(Debug, Clone, Copy)]
pub struct ProbeData<'a> {
    /// Input filename, possibly empty
    pub filename: &'a str,
    pub buf: &'a [u8],
}

impl<'a> ProbeData<'a> {
    pub fn new(filename: &'a str, buf: &'a [u8]) -> Self {
        ProbeData { filename, buf }
    }
}

/// Outcome of scoring one prefix
#[derive(Debug, Clone)]
pub struct ProbeDecision {
    pub format: Option<Arc<dyn InputFormat>>,
    /// Best score seen
    pub score: u32,
    /// Several formats shared the best score
    pub ambiguous: bool,
}

/// A probed input, rewound to where probing started
pub struct ProbedInput {
    pub format: Arc<dyn InputFormat>,
    pub score: u32,
    pub source: Box<dyn MediaSource>,
}

/// Size of the ID3v2 tag at the start of `buf`, header and footer included
pub fn id3v2_tag_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < 10
        || &buf[0..3] != b"ID3"
        || buf[3] == 0xff
        || buf[4] == 0xff
        || buf[6..10].iter().any(|b| b & 0x80 != 0)
    {
        return None;
    }
    let size = buf[6..10]
        .iter()
        .fold(0usize, |acc, &b| (acc << 7) | (b & 0x7f) as usize);
    let footer = if buf[5] & 0x10 != 0 { 10 } else { 0 };
    Some(size + 10 + footer)
}

/// Format detector over a registry of input formats
pub struct FormatDetector<'r> {
    registry: &'r FormatRegistry,
}

impl<'r> FormatDetector<'r> {
    pub fn new(registry: &'r FormatRegistry) -> Self {
        FormatDetector { registry }
    }

    /// Pick the format scoring strictly above `threshold`.
    ///
    /// `is_opened` is true when the data comes from a byte stream; formats
    /// that read from elsewhere are skipped then, and vice versa.
    pub fn detect(&self, data: &ProbeData, is_opened: bool, threshold: u32) -> ProbeDecision {
        let (buf, id3) = match id3v2_tag_len(data.buf) {
            Some(len) if data.buf.len() > 10 => {
                let buf = if data.buf.len() > len + 16 {
                    &data.buf[len..]
                } else {
                    data.buf
                };
                (buf, true)
            }
            _ => (data.buf, false),
        };
        let stripped = ProbeData::new(data.filename, buf);

        let mut decision = self.best_of(
            self.registry
                .iter()
                .filter(|f| f.info().flags.no_file != is_opened),
            &stripped,
            threshold,
        );

        // guess by extension when a large tag pushed the payload out of the prefix
        if decision.format.is_none() && is_opened && decision.score < PROBE_SCORE_RETRY {
            if let Some(f) = self
                .registry
                .iter()
                .find(|f| f.info().match_extension(data.filename))
            {
                decision = ProbeDecision {
                    format: Some(f.clone()),
                    score: PROBE_SCORE_RETRY,
                    ambiguous: false,
                };
            }
        }

        if decision.format.is_none() && id3 && decision.score < PROBE_SCORE_RETRY - 1 {
            if let Some(f) = self
                .registry
                .iter()
                .find(|f| f.info().extensions.iter().any(|e| e.eq_ignore_ascii_case("mp3")))
            {
                decision = ProbeDecision {
                    format: Some(f.clone()),
                    score: PROBE_SCORE_RETRY - 1,
                    ambiguous: false,
                };
            }
        }

        decision
    }

    /// Identify the codec of a raw elementary stream from its payload
    pub fn detect_elementary(&self, buf: &[u8], threshold: u32) -> Option<CodecId> {
        let data = ProbeData::new("", buf);
        let decision = self.best_of(self.registry.elementary(), &data, threshold);
        decision.format.and_then(|f| f.info().elementary_codec)
    }

    fn best_of<'a>(
        &self,
        formats: impl Iterator<Item = &'a Arc<dyn InputFormat>>,
        data: &ProbeData,
        threshold: u32,
    ) -> ProbeDecision {
        let mut best: Option<&Arc<dyn InputFormat>> = None;
        let mut max = threshold;

        for format in formats {
            let score = match format.probe(data) {
                Some(score) => score.min(PROBE_SCORE_MAX),
                None if format.info().match_extension(data.filename) => PROBE_SCORE_EXTENSION,
                None => 0,
            };
            if score > max {
                max = score;
                best = Some(format);
            } else if score == max {
                best = None;
            }
        }

        ProbeDecision {
            ambiguous: best.is_none() && max > threshold,
            format: best.cloned(),
            score: max,
        }
    }

    /// Detect the format of `source` by reading a growing prefix.
    ///
    /// The prefix starts at 2 KiB and doubles up to `max_size` (0 means
    /// 1 MiB; larger values are capped there). A partial prefix must score
    /// above a quarter of the maximum; the final one is accepted with any
    /// positive score. The returned source is positioned where probing started,
    /// replaying the probed bytes if it cannot seek.
    pub fn probe_buffer(
        &self,
        mut source: Box<dyn MediaSource>,
        filename: &str,
        max_size: usize,
    ) -> Result<ProbedInput> {
        let max_size = match max_size {
            0 => PROBE_BUF_MAX,
            n if n > PROBE_BUF_MAX => PROBE_BUF_MAX,
            n if n < PROBE_BUF_MIN => {
                return Err(Error::invalid_input(format!(
                    "probe size {} is below the minimum of {}",
                    n, PROBE_BUF_MIN
                )))
            }
            n => n,
        };

        let start = source.stream_position()?;
        let mut buf: Vec<u8> = Vec::new();
        let mut found: Option<(Arc<dyn InputFormat>, u32)> = None;
        let mut ambiguous = false;
        let mut probe_size = PROBE_BUF_MIN;

        while probe_size <= max_size && found.is_none() {
            let mut threshold = if probe_size < max_size { PROBE_SCORE_RETRY } else { 0 };

            let filled = buf.len();
            buf.resize(probe_size, 0);
            let read = read_up_to(&mut source, &mut buf[filled..])?;
            buf.truncate(filled + read);
            let at_eof = read == 0;
            if at_eof {
                threshold = 0;
            }

            let decision = self.detect(&ProbeData::new(filename, &buf), true, threshold);
            ambiguous = decision.ambiguous;
            if let Some(format) = decision.format {
                if decision.score <= PROBE_SCORE_RETRY {
                    warn!(
                        "Format {} detected only with low score of {}, misdetection possible",
                        format.info().name,
                        decision.score
                    );
                } else {
                    debug!(
                        "Probed {} with size={} and score={}",
                        format.info().name,
                        probe_size,
                        decision.score
                    );
                }
                found = Some((format, decision.score));
            }

            if at_eof {
                break;
            }
            probe_size = (probe_size << 1).min(max_size.max(probe_size + 1));
        }

        let Some((format, score)) = found else {
            return Err(Error::invalid_data(if ambiguous {
                "could not determine input format: several formats match equally"
            } else {
                "could not determine input format"
            }));
        };

        let source: Box<dyn MediaSource> = if source.is_seekable() {
            source.seek(SeekFrom::Start(start))?;
            source
        } else {
            Box::new(ProbeReplay::new(buf, source))
        };

        Ok(ProbedInput {
            format,
            score,
            source,
        })
    }
}

/// Fill as much of `buf` as the source provides before end of input
fn read_up_to(source: &mut dyn MediaSource, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match source.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(total)
}
