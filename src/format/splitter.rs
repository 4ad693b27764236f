//! Frame splitting on top of a bitstream parser
//!
//! A [`Splitter`] feeds container payloads to a [`BitstreamParser`] and
//! carries the container timestamps over to the frames the parser completes.
//! Timestamps are remembered per input packet in a small ring; a completed
//! frame takes the timestamps of the packet its first byte came from.

use super::stream::NeedParsing;
use crate::codec::{
    BitstreamParser, CodecParameters, DtsSync, FramePayload, ParsedFrame, ParserFlags, PictureType,
};
use crate::error::{Error, Result};
use crate::util::{Buffer, Timestamp};
use std::fmt;

const TIMESTAMP_SLOTS: usize = 4;

/// Byte span of one input packet in parser stream coordinates
#[derive(Debug, Clone, Copy)]
struct PacketSpan {
    offset: i64,
    end: i64,
    pts: Timestamp,
    dts: Timestamp,
    pos: i64,
    key: bool,
    valid: bool,
}

impl Default for PacketSpan {
    fn default() -> Self {
        PacketSpan {
            offset: 0,
            end: 0,
            pts: Timestamp::none(),
            dts: Timestamp::none(),
            pos: -1,
            key: false,
            valid: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Fetched {
    pts: Timestamp,
    dts: Timestamp,
    pos: i64,
    key: bool,
    offset: i64,
}

impl Default for Fetched {
    fn default() -> Self {
        Fetched {
            pts: Timestamp::none(),
            dts: Timestamp::none(),
            pos: -1,
            key: false,
            offset: 0,
        }
    }
}

/// A complete coded frame with the container timing it inherited
#[derive(Debug, Clone, PartialEq)]
pub struct SplitFrame {
    pub data: Buffer,
    pub pts: Timestamp,
    pub dts: Timestamp,
    /// Container position of the packet the frame started in
    pub pos: i64,
    pub key_frame: bool,
    pub pict_type: PictureType,
    pub repeat_pict: i32,
    /// Parser-reported duration in samples or codec ticks, 0 if unknown
    pub duration: i64,
    pub dts_sync: Option<DtsSync>,
    /// Bytes between the start of the timestamped packet and the frame start
    pub offset: i64,
    /// First frame this splitter produced
    pub first: bool,
}

/// Result of one parser step
#[derive(Debug, Default)]
pub struct SplitStep {
    pub consumed: usize,
    pub frame: Option<SplitFrame>,
}

/// Everything one input packet (or the final flush) produced
#[derive(Debug, Default)]
pub struct SplitOutcome {
    pub frames: Vec<SplitFrame>,
    /// Input the parser refused to consume, to be passed on unparsed
    pub stalled: Option<Buffer>,
}

/// Parser flags for a stream's parsing mode
pub fn parser_flags(need_parsing: NeedParsing) -> ParserFlags {
    ParserFlags {
        complete_frames: need_parsing == NeedParsing::Headers,
        once: need_parsing == NeedParsing::FullOnce,
    }
}

/// Splits one stream's raw payloads into coded frames
pub struct Splitter {
    backend: Box<dyn BitstreamParser>,
    flags: ParserFlags,
    spans: [PacketSpan; TIMESTAMP_SLOTS],
    head: usize,
    started: bool,
    cur_offset: i64,
    next_frame_offset: i64,
    frame_offset: i64,
    fetch_timestamp: bool,
    fetched: Fetched,
    frames_emitted: u64,
}

impl Splitter {
    pub fn new(backend: Box<dyn BitstreamParser>, flags: ParserFlags) -> Self {
        Splitter {
            backend,
            flags,
            spans: [PacketSpan::default(); TIMESTAMP_SLOTS],
            head: 0,
            started: false,
            cur_offset: 0,
            next_frame_offset: 0,
            frame_offset: 0,
            fetch_timestamp: true,
            fetched: Fetched::default(),
            frames_emitted: 0,
        }
    }

    pub fn flags(&self) -> ParserFlags {
        self.flags
    }

    /// Run the parser once over `data`.
    ///
    /// `pts`/`dts`/`pos`/`key` describe the packet `data` starts; pass unknown
    /// timestamps when `data` is the remainder of an earlier packet. An empty
    /// `data` asks the parser for a held-back frame.
    pub fn parse(
        &mut self,
        codec: &mut CodecParameters,
        data: &Buffer,
        pts: Timestamp,
        dts: Timestamp,
        pos: i64,
        key: bool,
    ) -> Result<SplitStep> {
        if !self.started {
            self.started = true;
            self.cur_offset = pos.max(0);
            self.next_frame_offset = self.cur_offset;
        }

        let len = data.len() as i64;
        if len > 0 && self.cur_offset + len != self.spans[self.head].end {
            self.head = (self.head + 1) % TIMESTAMP_SLOTS;
            self.spans[self.head] = PacketSpan {
                offset: self.cur_offset,
                end: self.cur_offset + len,
                pts,
                dts,
                pos,
                key,
                valid: true,
            };
        }

        if self.fetch_timestamp {
            self.fetch_timestamp = false;
            self.fetch();
        }

        let output = self.backend.parse(codec, data.as_slice(), self.flags)?;
        let consumed = output.consumed.min(data.len());

        let frame = match output.frame {
            Some(parsed) => self.complete(parsed, data, consumed)?,
            None => None,
        };

        self.cur_offset += consumed as i64;
        Ok(SplitStep { consumed, frame })
    }

    /// Split a whole packet, or drain the parser when `data` is empty
    pub fn feed(
        &mut self,
        codec: &mut CodecParameters,
        data: &Buffer,
        pts: Timestamp,
        dts: Timestamp,
        pos: i64,
        key: bool,
    ) -> Result<SplitOutcome> {
        let flushing = data.is_empty();
        let mut rest = data.clone();
        let (mut pts, mut dts) = (pts, dts);
        let mut got_output = flushing;
        let mut outcome = SplitOutcome::default();

        while !rest.is_empty() || (flushing && got_output) {
            let step = self.parse(codec, &rest, pts, dts, pos, key)?;
            pts = Timestamp::none();
            dts = Timestamp::none();
            got_output = step.frame.is_some();

            if step.consumed == 0 && !got_output && !rest.is_empty() {
                outcome.stalled = Some(rest);
                break;
            }

            rest = rest.slice(step.consumed..rest.len());
            if let Some(frame) = step.frame {
                outcome.frames.push(frame);
            }
        }

        Ok(outcome)
    }

    /// Length of an out-of-band header at the start of `data`, if the parser finds one
    pub fn split(&self, codec: &CodecParameters, data: &[u8]) -> Option<usize> {
        if !self.backend.can_split() {
            return None;
        }
        let len = self.backend.split(codec, data);
        (len > 0 && len <= data.len()).then_some(len)
    }

    /// Whether the parser can extract out-of-band headers
    pub fn can_split(&self) -> bool {
        self.backend.can_split()
    }

    pub fn close(mut self) {
        self.backend.close();
    }

    fn complete(
        &mut self,
        parsed: ParsedFrame,
        input: &Buffer,
        consumed: usize,
    ) -> Result<Option<SplitFrame>> {
        // without a parser decision the container flag of the starting packet holds
        let key_frame = match (parsed.key_frame, parsed.pict_type) {
            (None, PictureType::None) => self.fetched.key,
            _ => parsed.is_key(),
        };
        let data = match parsed.payload {
            FramePayload::Input(range) => {
                if range.start > range.end || range.end > input.len() {
                    return Err(Error::codec(format!(
                        "parser returned frame range {:?} outside {} input bytes",
                        range,
                        input.len()
                    )));
                }
                input.slice(range)
            }
            FramePayload::Owned(bytes) => Buffer::from_vec(bytes),
        };
        if data.is_empty() {
            return Ok(None);
        }

        self.frame_offset = self.next_frame_offset;
        self.next_frame_offset = self.cur_offset + consumed as i64;
        self.fetch_timestamp = true;
        self.frames_emitted += 1;

        Ok(Some(SplitFrame {
            data,
            pts: self.fetched.pts,
            dts: self.fetched.dts,
            pos: self.fetched.pos,
            key_frame,
            pict_type: parsed.pict_type,
            repeat_pict: parsed.repeat_pict,
            duration: parsed.duration,
            dts_sync: parsed.dts_sync,
            offset: self.fetched.offset,
            first: self.frames_emitted == 1,
        }))
    }

    /// Pick the timestamps of the packet the next frame starts in
    fn fetch(&mut self) {
        self.fetched = Fetched::default();
        for span in self.spans.iter().filter(|s| s.valid) {
            if self.cur_offset >= span.offset
                && (self.frame_offset < span.offset || self.frames_emitted == 0)
            {
                self.fetched = Fetched {
                    pts: span.pts,
                    dts: span.dts,
                    pos: span.pos,
                    key: span.key,
                    offset: self.next_frame_offset - span.offset,
                };
                if self.cur_offset < span.end {
                    break;
                }
            }
        }
    }
}

impl fmt::Debug for Splitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Splitter")
            .field("flags", &self.flags)
            .field("cur_offset", &self.cur_offset)
            .field("frame_offset", &self.frame_offset)
            .field("frames_emitted", &self.frames_emitted)
            .finish()
    }
}
