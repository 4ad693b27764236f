//! Common test utilities for ZVD Demux integration tests
//!
//! Provides a tiny fixed-record container ("ZMUX") with a matching reader,
//! plus mock formats, parsers and decoders to drive the demuxing pipeline.

#![allow(dead_code)]

use std::io::{Cursor, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use zvd_demux::codec::{
    BitstreamParser, CodecId, CodecParameters, CodecRegistry, DecodeStatus, Decoder,
    DecoderOptions, FramePayload, ParseOutput, ParsedFrame, ParserFlags,
};
use zvd_demux::error::{Error, Result};
use zvd_demux::format::{
    DemuxHeader, DemuxOptions, Demuxer, DemuxerContext, FormatRegistry, InputFormat,
    MediaSource, Packet, StreamInfo,
};
use zvd_demux::format::{FormatFlags, FormatInfo};
use zvd_demux::probe::ProbeData;
use zvd_demux::util::{Buffer, MediaType, Rational};

// ============================================================================
// ZMUX container
// ============================================================================

pub const MAGIC: &[u8; 8] = b"ZMUXv001";
pub const RECORD_HEADER: usize = 24;
pub const PAYLOAD_CAPACITY: usize = 40;
pub const RECORD_SIZE: usize = RECORD_HEADER + PAYLOAD_CAPACITY;
pub const DATA_OFFSET: i64 = MAGIC.len() as i64;

const FLAG_KEY: u8 = 1;
const FLAG_CORRUPT: u8 = 2;

/// Byte position of record `i`
pub fn record_pos(i: usize) -> i64 {
    DATA_OFFSET + (i * RECORD_SIZE) as i64
}

/// One packet as stored in a ZMUX file
#[derive(Debug, Clone)]
pub struct Record {
    pub stream: u8,
    pub key: bool,
    pub corrupt: bool,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub payload: Vec<u8>,
}

impl Record {
    pub fn new(stream: u8, pts: Option<i64>, dts: Option<i64>, payload: Vec<u8>) -> Self {
        assert!(payload.len() <= PAYLOAD_CAPACITY);
        Record {
            stream,
            key: false,
            corrupt: false,
            pts,
            dts,
            payload,
        }
    }

    /// Record whose pts and dts are both `ts`
    pub fn timed(stream: u8, ts: i64) -> Self {
        Record::new(stream, Some(ts), Some(ts), vec![ts as u8; 16])
    }

    pub fn key(mut self) -> Self {
        self.key = true;
        self
    }

    pub fn corrupt(mut self) -> Self {
        self.corrupt = true;
        self
    }
}

/// Serialize records into a ZMUX file
pub fn zmux_bytes(records: &[Record]) -> Vec<u8> {
    let mut out = MAGIC.to_vec();
    for r in records {
        let mut flags = 0;
        if r.key {
            flags |= FLAG_KEY;
        }
        if r.corrupt {
            flags |= FLAG_CORRUPT;
        }
        out.push(r.stream);
        out.push(flags);
        out.extend_from_slice(&(r.payload.len() as u16).to_le_bytes());
        out.extend_from_slice(&[0u8; 4]);
        out.extend_from_slice(&r.pts.unwrap_or(i64::MIN).to_le_bytes());
        out.extend_from_slice(&r.dts.unwrap_or(i64::MIN).to_le_bytes());
        let mut payload = r.payload.clone();
        payload.resize(PAYLOAD_CAPACITY, 0);
        out.extend_from_slice(&payload);
    }
    out
}

/// `count` records of stream 0 stamped 0, 1, 2, ..., a keyframe every `gop`
pub fn timed_records(count: usize, gop: usize) -> Vec<Record> {
    (0..count)
        .map(|i| {
            let r = Record::timed(0, i as i64);
            if i % gop == 0 {
                r.key()
            } else {
                r
            }
        })
        .collect()
}

struct RawRecord {
    stream: usize,
    flags: u8,
    pts: i64,
    dts: i64,
    payload: Vec<u8>,
}

fn read_record(io: &mut dyn MediaSource) -> Result<Option<RawRecord>> {
    let mut buf = [0u8; RECORD_SIZE];
    match io.read_exact(&mut buf) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u16::from_le_bytes([buf[2], buf[3]]) as usize;
    if len > PAYLOAD_CAPACITY {
        return Err(Error::invalid_data(format!("record payload of {} bytes", len)));
    }
    let mut ts = [0u8; 8];
    ts.copy_from_slice(&buf[8..16]);
    let pts = i64::from_le_bytes(ts);
    ts.copy_from_slice(&buf[16..24]);
    let dts = i64::from_le_bytes(ts);
    Ok(Some(RawRecord {
        stream: buf[0] as usize,
        flags: buf[1],
        pts,
        dts,
        payload: buf[RECORD_HEADER..RECORD_HEADER + len].to_vec(),
    }))
}

/// Reader for ZMUX files; streams come from the format's template
pub struct ZmuxDemuxer {
    header: DemuxHeader,
    declared: usize,
    late: Vec<StreamInfo>,
    announced: Vec<StreamInfo>,
    closed: Arc<AtomicUsize>,
}

impl Demuxer for ZmuxDemuxer {
    fn read_header(&mut self, io: &mut dyn MediaSource) -> Result<DemuxHeader> {
        let mut magic = [0u8; 8];
        io.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(Error::format("not a ZMUX file"));
        }
        self.declared = self.header.streams.len();
        Ok(self.header.clone())
    }

    fn read_packet(&mut self, io: &mut dyn MediaSource) -> Result<Packet> {
        let pos = io.stream_position()? as i64;
        let Some(rec) = read_record(io)? else {
            return Err(Error::EndOfStream);
        };
        if rec.stream >= self.declared && !self.late.is_empty() {
            self.announced.push(self.late.remove(0));
            self.declared += 1;
        }

        let mut pkt = Packet::new(rec.stream, Buffer::from_vec(rec.payload))
            .with_timestamps(rec.pts, rec.dts)
            .with_position(pos)
            .with_keyframe(rec.flags & FLAG_KEY != 0);
        pkt.flags.corrupt = rec.flags & FLAG_CORRUPT != 0;
        Ok(pkt)
    }

    fn read_timestamp(
        &mut self,
        io: &mut dyn MediaSource,
        stream: usize,
        pos: i64,
        pos_limit: i64,
    ) -> Result<Option<(i64, i64)>> {
        let record = (pos - DATA_OFFSET).max(0);
        let index = (record + RECORD_SIZE as i64 - 1) / RECORD_SIZE as i64;
        let mut at = DATA_OFFSET + index * RECORD_SIZE as i64;
        io.seek(SeekFrom::Start(at as u64))?;

        while at <= pos_limit {
            let Some(rec) = read_record(io)? else {
                return Ok(None);
            };
            if rec.stream == stream && rec.flags & FLAG_KEY != 0 && rec.dts != i64::MIN {
                return Ok(Some((rec.dts, at)));
            }
            at += RECORD_SIZE as i64;
        }
        Ok(None)
    }

    fn new_streams(&mut self) -> Vec<StreamInfo> {
        std::mem::take(&mut self.announced)
    }

    fn close(&mut self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// The ZMUX format, opened with a fixed set of streams
pub struct ZmuxFormat {
    info: FormatInfo,
    header: DemuxHeader,
    late: Vec<StreamInfo>,
    pub closed: Arc<AtomicUsize>,
}

impl ZmuxFormat {
    pub fn new(streams: Vec<StreamInfo>) -> Self {
        ZmuxFormat {
            info: FormatInfo::new("zmux", "ZVD test multiplex")
                .with_extensions(&["zmx"])
                .with_flags(FormatFlags {
                    generic_index: true,
                    ..FormatFlags::default()
                }),
            header: DemuxHeader::new(streams),
            late: Vec::new(),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_flags(mut self, flags: FormatFlags) -> Self {
        self.info.flags = flags;
        self
    }

    /// Streams announced only once their first record is read
    pub fn with_late_streams(mut self, late: Vec<StreamInfo>) -> Self {
        self.late = late;
        self
    }

    pub fn with_header(mut self, header: DemuxHeader) -> Self {
        self.header = header;
        self
    }
}

impl InputFormat for ZmuxFormat {
    fn info(&self) -> &FormatInfo {
        &self.info
    }

    fn probe(&self, data: &ProbeData) -> Option<u32> {
        data.buf.starts_with(MAGIC).then_some(100)
    }

    fn create(&self) -> Box<dyn Demuxer> {
        Box::new(ZmuxDemuxer {
            header: self.header.clone(),
            declared: 0,
            late: self.late.clone(),
            announced: Vec::new(),
            closed: self.closed.clone(),
        })
    }
}

// ============================================================================
// Other formats
// ============================================================================

/// A reader that never produces anything
pub struct SilentDemuxer;

impl Demuxer for SilentDemuxer {
    fn read_header(&mut self, _io: &mut dyn MediaSource) -> Result<DemuxHeader> {
        Ok(DemuxHeader::default())
    }

    fn read_packet(&mut self, _io: &mut dyn MediaSource) -> Result<Packet> {
        Err(Error::EndOfStream)
    }
}

/// Claims any input starting with `magic` with a fixed score
pub struct MagicFormat {
    info: FormatInfo,
    magic: &'static [u8],
    score: u32,
}

impl MagicFormat {
    pub fn new(name: &str, magic: &'static [u8], score: u32) -> Self {
        MagicFormat {
            info: FormatInfo::new(name, name),
            magic,
            score,
        }
    }

    /// Raw elementary stream format for `codec`
    pub fn elementary(name: &str, magic: &'static [u8], score: u32, codec: CodecId) -> Self {
        let mut format = Self::new(name, magic, score);
        format.info = format.info.with_elementary_codec(codec);
        format
    }
}

impl InputFormat for MagicFormat {
    fn info(&self) -> &FormatInfo {
        &self.info
    }

    fn probe(&self, data: &ProbeData) -> Option<u32> {
        data.buf.starts_with(self.magic).then_some(self.score)
    }

    fn create(&self) -> Box<dyn Demuxer> {
        Box::new(SilentDemuxer)
    }
}

// ============================================================================
// Parsers and decoders
// ============================================================================

/// Cuts the byte stream into frames of `size` bytes, each `duration` long
#[derive(Debug, Clone)]
pub struct FixedChunkParser {
    size: usize,
    duration: i64,
    pending: Vec<u8>,
}

impl FixedChunkParser {
    pub fn new(size: usize, duration: i64) -> Self {
        FixedChunkParser {
            size,
            duration,
            pending: Vec::new(),
        }
    }

    fn frame(&mut self) -> ParsedFrame {
        let mut frame = ParsedFrame::new(FramePayload::Owned(std::mem::take(&mut self.pending)));
        frame.duration = self.duration;
        frame
    }
}

impl BitstreamParser for FixedChunkParser {
    fn parse(
        &mut self,
        _codec: &mut CodecParameters,
        data: &[u8],
        _flags: ParserFlags,
    ) -> Result<ParseOutput> {
        if data.is_empty() {
            let frame = (!self.pending.is_empty()).then(|| self.frame());
            return Ok(ParseOutput { consumed: 0, frame });
        }
        let take = (self.size - self.pending.len()).min(data.len());
        self.pending.extend_from_slice(&data[..take]);
        let frame = (self.pending.len() == self.size).then(|| self.frame());
        Ok(ParseOutput { consumed: take, frame })
    }
}

/// Passes packets through, reporting a global header when one leads the data
#[derive(Debug, Clone, Default)]
pub struct HeaderSplitParser;

pub const START_CODE: [u8; 4] = [0, 0, 0, 1];

impl BitstreamParser for HeaderSplitParser {
    fn parse(
        &mut self,
        _codec: &mut CodecParameters,
        data: &[u8],
        _flags: ParserFlags,
    ) -> Result<ParseOutput> {
        let frame = (!data.is_empty()).then(|| ParsedFrame::new(FramePayload::Input(0..data.len())));
        Ok(ParseOutput {
            consumed: data.len(),
            frame,
        })
    }

    fn can_split(&self) -> bool {
        true
    }

    fn split(&self, _codec: &CodecParameters, data: &[u8]) -> usize {
        if data.starts_with(&START_CODE) {
            START_CODE.len()
        } else {
            0
        }
    }
}

/// Learns the stream parameters after decoding `needed` packets
pub struct ParamDecoder {
    needed: usize,
    decoded: usize,
}

impl ParamDecoder {
    pub fn new(needed: usize) -> Self {
        ParamDecoder { needed, decoded: 0 }
    }
}

impl Decoder for ParamDecoder {
    fn open(&mut self, _params: &mut CodecParameters, _options: &DecoderOptions) -> Result<()> {
        Ok(())
    }

    fn decode(&mut self, params: &mut CodecParameters, data: &[u8]) -> Result<DecodeStatus> {
        if data.is_empty() {
            return Ok(DecodeStatus::default());
        }
        self.decoded += 1;
        if self.decoded >= self.needed {
            match params.media_type {
                MediaType::Audio => {
                    params.sample_rate = 48000;
                    params.channels = 2;
                    params.sample_fmt = Some("s16p".to_string());
                }
                MediaType::Video => {
                    params.width = 640;
                    params.height = 360;
                    params.pix_fmt = Some("yuv420p".to_string());
                }
                _ => {}
            }
        }
        Ok(DecodeStatus {
            consumed: data.len(),
            got_output: true,
        })
    }
}

// ============================================================================
// Stream declarations and sessions
// ============================================================================

/// A fully described video stream at 1/25 time base
pub fn video_stream(codec: CodecId) -> StreamInfo {
    let mut params = CodecParameters::new(codec);
    params.width = 320;
    params.height = 240;
    params.pix_fmt = Some("yuv420p".to_string());
    StreamInfo::new(params).with_time_base(Rational::new(1, 25))
}

/// An audio stream with the given sample rate as time base
pub fn audio_stream(codec: CodecId, sample_rate: u32) -> StreamInfo {
    let mut params = CodecParameters::new(codec);
    params.sample_rate = sample_rate;
    params.channels = 2;
    params.sample_fmt = Some("s16".to_string());
    StreamInfo::new(params).with_time_base(Rational::new(1, sample_rate as i64))
}

/// Registry holding only `format`
pub fn registry_with(format: ZmuxFormat) -> FormatRegistry {
    let mut formats = FormatRegistry::new();
    formats.register(format);
    formats
}

/// Open `records` as a ZMUX input with the given streams
pub fn open_zmux(
    streams: Vec<StreamInfo>,
    records: &[Record],
    options: DemuxOptions,
) -> DemuxerContext {
    open_zmux_with(ZmuxFormat::new(streams), records, CodecRegistry::new(), options)
}

/// Open `records` with a custom format and codec registry
pub fn open_zmux_with(
    format: ZmuxFormat,
    records: &[Record],
    codecs: CodecRegistry,
    options: DemuxOptions,
) -> DemuxerContext {
    let formats = registry_with(format);
    DemuxerContext::open_input(
        Box::new(Cursor::new(zmux_bytes(records))),
        "clip.zmx",
        &formats,
        Arc::new(codecs),
        options,
    )
    .expect("failed to open ZMUX input")
}

/// Read every remaining frame until the input ends
pub fn read_all(ctx: &mut DemuxerContext) -> Vec<Packet> {
    let mut packets = Vec::new();
    loop {
        match ctx.read_frame() {
            Ok(pkt) => packets.push(pkt),
            Err(Error::EndOfStream) => return packets,
            Err(e) => panic!("unexpected read error: {}", e),
        }
    }
}

/// Pts values of `packets`, `None` where unknown
pub fn pts_of(packets: &[Packet]) -> Vec<Option<i64>> {
    packets.iter().map(|p| p.pts.get()).collect()
}

/// Dts values of `packets`, `None` where unknown
pub fn dts_of(packets: &[Packet]) -> Vec<Option<i64>> {
    packets.iter().map(|p| p.dts.get()).collect()
}
