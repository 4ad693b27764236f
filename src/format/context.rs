//! Demuxing session
//!
//! A [`DemuxerContext`] owns one opened input: the container reader, its byte
//! source, every stream and three packet queues.
//!
//! - `raw_buffer` holds reader packets while a stream's codec is still being
//!   sniffed from its payload
//! - `parse_queue` holds frames a splitter produced but nobody asked for yet
//! - `reorder_buffer` holds packets read ahead by stream-info inference or by
//!   pts generation
//!
//! Reading pulls packets through these stages in that order; seeking flushes
//! all of them.

use super::demuxer::Demuxer;
use super::index::{IndexEntries, IndexEntry};
use super::io::MediaSource;
use super::options::DemuxOptions;
use super::queue::PacketQueue;
use super::registry::FormatRegistry;
use super::seek::{self, SearchBounds, SeekFlags};
use super::splitter::{parser_flags, Splitter};
use super::stream::{Discard, NeedParsing, Stream, StreamInfo};
use super::timestamps::{FrameHints, TimestampReconciler};
use super::{FormatInfo, InputFormat, Packet};
use crate::codec::CodecRegistry;
use crate::error::{Error, Result};
use crate::probe::{FormatDetector, StreamAnalyzer, StreamInfoReport, PROBE_SCORE_MAX};
use crate::util::{
    compare_mod, rescale, rescale_q_rnd, Buffer, MediaType, Rational, Rounding, Timestamp,
    TIME_BASE_US,
};
use std::collections::HashMap;
use std::fmt;
use std::io::SeekFrom;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// Polled before every reader call; returning true aborts the current operation
pub type InterruptCallback = Box<dyn Fn() -> bool + Send>;

/// Context for demuxing operations
pub struct DemuxerContext {
    pub(crate) format: Arc<dyn InputFormat>,
    demuxer: Box<dyn Demuxer>,
    io: Box<dyn MediaSource>,
    formats: FormatRegistry,
    pub(crate) codecs: Arc<CodecRegistry>,
    pub(crate) options: DemuxOptions,
    pub(crate) streams: Vec<Stream>,
    raw_buffer: PacketQueue,
    parse_queue: PacketQueue,
    pub(crate) reorder_buffer: PacketQueue,
    reconciler: TimestampReconciler,
    filename: String,
    data_offset: i64,
    pub(crate) file_size: Option<u64>,
    /// Microseconds
    pub(crate) start_time: Timestamp,
    /// Microseconds
    pub(crate) duration: Timestamp,
    pub(crate) bit_rate: i64,
    metadata: HashMap<String, String>,
    interrupt: Option<InterruptCallback>,
}

impl DemuxerContext {
    /// Probe `source` for its format and open it
    pub fn open_input(
        source: Box<dyn MediaSource>,
        filename: &str,
        formats: &FormatRegistry,
        codecs: Arc<CodecRegistry>,
        options: DemuxOptions,
    ) -> Result<Self> {
        options.validate()?;
        let probed = FormatDetector::new(formats).probe_buffer(
            source,
            filename,
            options.format_probe_size,
        )?;
        debug!(
            "Input '{}' probed as {} (score {})",
            filename,
            probed.format.info().name,
            probed.score
        );
        Self::open_format(probed.format, probed.source, filename, formats, codecs, options)
    }

    /// Open `source` with a known format
    pub fn open_format(
        format: Arc<dyn InputFormat>,
        mut io: Box<dyn MediaSource>,
        filename: &str,
        formats: &FormatRegistry,
        codecs: Arc<CodecRegistry>,
        options: DemuxOptions,
    ) -> Result<Self> {
        options.validate()?;
        let mut demuxer = format.create();
        let header = demuxer.read_header(&mut *io)?;
        let data_offset = io.stream_position()? as i64;
        let file_size = io.byte_len();

        let mut ctx = DemuxerContext {
            reconciler: TimestampReconciler::new(&options.flags),
            raw_buffer: PacketQueue::with_budget(options.raw_packet_buffer_size),
            parse_queue: PacketQueue::new(),
            reorder_buffer: PacketQueue::new(),
            format,
            demuxer,
            io,
            formats: formats.clone(),
            codecs,
            options,
            streams: Vec::new(),
            filename: filename.to_string(),
            data_offset,
            file_size,
            start_time: header.start_time.into(),
            duration: header.duration.into(),
            bit_rate: header.bit_rate,
            metadata: header.metadata,
            interrupt: None,
        };
        for info in header.streams {
            ctx.add_stream(info);
        }
        ctx.queue_attached_pictures()?;

        debug!(
            "Opened {} with {} streams, data at offset {}",
            ctx.format.info().name,
            ctx.streams.len(),
            data_offset
        );
        Ok(ctx)
    }

    fn add_stream(&mut self, info: StreamInfo) -> usize {
        let index = self.streams.len();
        self.streams
            .push(Stream::new(index, info, self.options.max_probe_packets));
        index
    }

    fn add_new_streams(&mut self) {
        for info in self.demuxer.new_streams() {
            let index = self.add_stream(info);
            debug!("New stream discovered: {}", self.streams[index]);
        }
    }

    /// Install a callback polled before every reader call
    pub fn set_interrupt_callback(&mut self, callback: impl Fn() -> bool + Send + 'static) {
        self.interrupt = Some(Box::new(callback));
    }

    pub(crate) fn check_interrupt(&self) -> Result<()> {
        match &self.interrupt {
            Some(callback) if callback() => Err(Error::Interrupted),
            _ => Ok(()),
        }
    }

    pub fn format_info(&self) -> &FormatInfo {
        self.format.info()
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    pub fn stream(&self, index: usize) -> Option<&Stream> {
        self.streams.get(index)
    }

    pub fn options(&self) -> &DemuxOptions {
        &self.options
    }

    /// Position of the first media byte after the header
    pub fn data_offset(&self) -> i64 {
        self.data_offset
    }

    pub fn file_size(&self) -> Option<u64> {
        self.file_size
    }

    /// Start time in microseconds
    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    /// Duration in microseconds
    pub fn duration(&self) -> Timestamp {
        self.duration
    }

    pub fn bit_rate(&self) -> i64 {
        self.bit_rate
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// Byte position the reader is at
    pub fn position(&mut self) -> Result<u64> {
        Ok(self.io.stream_position()?)
    }

    /// Packets held back by inference or pts generation
    pub fn buffered_packets(&self) -> usize {
        self.reorder_buffer.len()
    }

    /// Add a seek point to a stream's index, halving the index when it is full
    pub fn add_index_entry(&mut self, stream: usize, entry: IndexEntry) -> Result<usize> {
        let max_entries = IndexEntries::max_entries_for(self.options.max_index_size);
        let st = self
            .streams
            .get_mut(stream)
            .ok_or_else(|| Error::invalid_input(format!("no stream {}", stream)))?;
        st.index_entries.reduce(max_entries);
        st.index_entries.add(entry)
    }

    fn queue_attached_pictures(&mut self) -> Result<()> {
        for st in &self.streams {
            if !st.info.disposition.attached_pic || st.info.discard >= Discard::All {
                continue;
            }
            if let Some(picture) = &st.info.attached_pic {
                let mut pkt = picture.clone();
                pkt.stream_index = st.index;
                self.raw_buffer.push(pkt)?;
            }
        }
        Ok(())
    }

    /// Next packet from the reader, after codec sniffing for `Probe` streams
    pub(crate) fn read_packet_raw(&mut self) -> Result<Packet> {
        loop {
            if let Some(front) = self.raw_buffer.front() {
                let idx = front.stream_index;
                let size = front.size() as i64;
                let st = &self.streams[idx];
                if !st.is_probing() || st.probe_packets == 0 || self.raw_buffer.remaining() < size {
                    if self.streams[idx].probe_packets > 0 {
                        self.probe_codec(idx, None);
                    }
                    let pkt = self.raw_buffer.pop_front()?;
                    self.streams[idx].probe_data = Vec::new();
                    return Ok(pkt);
                }
            }

            self.check_interrupt()?;
            let result = self.demuxer.read_packet(&mut *self.io);
            self.add_new_streams();

            let pkt = match result {
                Ok(pkt) => pkt,
                Err(err) => {
                    if self.raw_buffer.is_empty() || err.is_retry() || err.is_fatal() {
                        return Err(err);
                    }
                    for idx in 0..self.streams.len() {
                        if self.streams[idx].probe_packets > 0 {
                            self.probe_codec(idx, None);
                        }
                    }
                    continue;
                }
            };

            if pkt.stream_index >= self.streams.len() {
                return Err(Error::invalid_data(format!(
                    "packet for unknown stream {}",
                    pkt.stream_index
                )));
            }
            if self.options.flags.discard_corrupt && pkt.flags.corrupt {
                warn!("Dropped corrupted packet (stream = {})", pkt.stream_index);
                continue;
            }

            let idx = pkt.stream_index;
            if let Some(codec) = self.options.forced_codec(self.streams[idx].media_type()) {
                self.streams[idx].codec_mut().codec_id = codec;
            }

            let st = &self.streams[idx];
            if self.raw_buffer.is_empty() && (!st.is_probing() || st.probe_packets == 0) {
                return Ok(pkt);
            }

            let payload = pkt.data.clone();
            self.raw_buffer.push(pkt)?;
            self.probe_codec(idx, Some(payload.as_slice()));
        }
    }

    /// Accumulate `data` for a `Probe` stream and sniff its codec.
    ///
    /// `None` forces a last attempt with whatever has been collected.
    fn probe_codec(&mut self, idx: usize, data: Option<&[u8]>) {
        let st = &mut self.streams[idx];
        if !st.is_probing() {
            return;
        }
        debug!("probing stream {}", idx);
        st.probe_packets = st.probe_packets.saturating_sub(1);

        let previous = st.probe_data.len();
        let appended = match data {
            Some(data) if st.probe_data.try_reserve(data.len()).is_ok() => {
                st.probe_data.extend_from_slice(data);
                true
            }
            _ => false,
        };
        if !appended {
            st.probe_packets = 0;
            if st.probe_data.is_empty() {
                error!("nothing to probe for stream {}", idx);
                return;
            }
        }

        let size = st.probe_data.len();
        if st.probe_packets == 0 || log2(size) != log2(previous) {
            let threshold = if st.probe_packets > 0 { PROBE_SCORE_MAX / 4 } else { 0 };
            let detected =
                FormatDetector::new(&self.formats).detect_elementary(&st.probe_data, threshold);
            if let Some(codec) = detected {
                st.info.codec.codec_id = codec;
                st.info.codec.media_type = codec.media_type();
                st.probe_data = Vec::new();
                debug!("probed stream {} as {}", idx, codec);
            }
        }
    }

    /// Create the splitter a stream's parsing mode asks for
    fn ensure_parser(&mut self, idx: usize) {
        let st = &mut self.streams[idx];
        if st.info.need_parsing == NeedParsing::None || st.has_parser() || self.options.flags.no_parse {
            return;
        }
        match self.codecs.create_parser(st.info.codec.codec_id) {
            Some(backend) => {
                st.parser = Some(Splitter::new(backend, parser_flags(st.info.need_parsing)));
            }
            None => {
                debug!("no parser for {}, passing stream {} through", st.info.codec.codec_id, idx);
                st.info.need_parsing = NeedParsing::None;
            }
        }
    }

    fn reconcile(&mut self, idx: usize, pkt: &mut Packet, hints: Option<&FrameHints>) {
        self.reconciler
            .reconcile(&mut self.streams[idx], pkt, hints, &mut self.reorder_buffer);
    }

    fn add_generic_index_entry(&mut self, idx: usize, pos: i64, timestamp: i64) -> Result<()> {
        self.add_index_entry(idx, IndexEntry::keyframe(pos, timestamp))?;
        Ok(())
    }

    /// Next complete, timestamped frame, bypassing the read-ahead buffer
    pub(crate) fn read_frame_internal(&mut self) -> Result<Packet> {
        let mut failure = None;

        while self.parse_queue.is_empty() {
            let pkt = match self.read_packet_raw() {
                Ok(pkt) => pkt,
                Err(err) if err.is_retry() || err.is_fatal() => return Err(err),
                Err(err) => {
                    for idx in 0..self.streams.len() {
                        let st = &self.streams[idx];
                        if st.has_parser() && st.info.need_parsing != NeedParsing::None {
                            self.parse_packet(idx, None)?;
                        }
                    }
                    failure = Some(err);
                    break;
                }
            };

            let idx = pkt.stream_index;
            if let (Some(pts), Some(dts)) = (pkt.pts.get(), pkt.dts.get()) {
                if pts < dts {
                    warn!(
                        "Invalid timestamps stream={}, pts={}, dts={}, size={}",
                        idx,
                        pts,
                        dts,
                        pkt.size()
                    );
                }
            }

            self.ensure_parser(idx);
            let st = &self.streams[idx];
            if st.info.need_parsing == NeedParsing::None || !st.has_parser() {
                let mut pkt = pkt;
                self.reconcile(idx, &mut pkt, None);
                if self.format.info().flags.generic_index && pkt.is_keyframe() {
                    if let Some(dts) = pkt.dts.get() {
                        self.add_generic_index_entry(idx, pkt.position, dts)?;
                    }
                }
                return Ok(pkt);
            } else if st.info.discard < Discard::All {
                self.parse_packet(idx, Some(pkt))?;
            }
        }

        match self.parse_queue.pop_front() {
            Ok(pkt) => Ok(pkt),
            Err(_) => Err(failure.unwrap_or(Error::EndOfStream)),
        }
    }

    /// Split `pkt` (or flush the splitter when `None`) into `parse_queue`
    fn parse_packet(&mut self, idx: usize, pkt: Option<Packet>) -> Result<()> {
        let flushing = pkt.is_none();
        let (data, pts, dts, pos, key) = match &pkt {
            Some(p) => (p.data.clone(), p.pts, p.dts, p.position, p.is_keyframe()),
            None => (Buffer::empty(), Timestamp::none(), Timestamp::none(), -1, false),
        };

        let st = &mut self.streams[idx];
        let Some(parser) = st.parser.as_mut() else {
            return Ok(());
        };
        let outcome = parser.feed(&mut st.info.codec, &data, pts, dts, pos, key)?;

        let generic_index = self.format.info().flags.generic_index;
        for frame in outcome.frames {
            let st = &self.streams[idx];
            let codec = &st.info.codec;
            let duration = if codec.media_type == MediaType::Audio {
                if codec.sample_rate > 0 {
                    rescale_q_rnd(
                        frame.duration,
                        Rational::new(1, codec.sample_rate as i64),
                        st.info.time_base,
                        Rounding::Down,
                    )
                } else {
                    0
                }
            } else if !codec.time_base.is_zero() {
                rescale_q_rnd(frame.duration, codec.time_base, st.info.time_base, Rounding::Down)
            } else {
                0
            };

            let mut out = Packet::new(idx, frame.data.clone())
                .with_timestamps(frame.pts, frame.dts)
                .with_position(frame.pos)
                .with_duration(duration)
                .with_keyframe(frame.key_frame);
            let hints = FrameHints::from_frame(&frame);
            self.reconcile(idx, &mut out, Some(&hints));

            // the stream's first frame is left out of the index
            if generic_index && out.is_keyframe() && !frame.first {
                if let Some(dts) = out.dts.get() {
                    self.add_generic_index_entry(idx, frame.pos, dts)?;
                }
            }
            self.parse_queue.push(out)?;
        }

        if let Some(rest) = outcome.stalled {
            warn!("Parser for stream {} stopped consuming input, passing data through", idx);
            let mut raw = Packet::new(idx, rest.clone());
            if let Some(p) = pkt.as_ref().filter(|p| p.size() == rest.len()) {
                raw = raw
                    .with_timestamps(p.pts, p.dts)
                    .with_position(p.position)
                    .with_duration(p.duration);
                raw.flags = p.flags;
            }
            let st = &mut self.streams[idx];
            st.info.need_parsing = NeedParsing::None;
            st.close_parser();
            self.reconcile(idx, &mut raw, None);
            self.parse_queue.push(raw)?;
        }

        if flushing {
            self.streams[idx].close_parser();
        }
        Ok(())
    }

    /// Return the next frame of the input.
    ///
    /// Packets read ahead during stream-info inference are returned first.
    /// With pts generation on, packets whose pts is still unknown are held
    /// until a later packet of their stream reveals it.
    pub fn read_frame(&mut self) -> Result<Packet> {
        if !self.options.flags.gen_pts {
            return match self.reorder_buffer.pop_front() {
                Ok(pkt) => Ok(pkt),
                Err(_) => self.read_frame_internal(),
            };
        }

        let mut eof = false;
        loop {
            if !self.reorder_buffer.is_empty() {
                self.fill_pts_from_lookahead();
                if let Some(head) = self.reorder_buffer.front() {
                    if !(head.pts.is_none() && head.dts.is_valid() && !eof) {
                        return self.reorder_buffer.pop_front();
                    }
                }
            }

            match self.read_frame_internal() {
                Ok(pkt) => self.reorder_buffer.push(pkt)?,
                Err(err) => {
                    if !self.reorder_buffer.is_empty() && !err.is_retry() && !err.is_fatal() {
                        eof = true;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Give the head packet the dts of the next non-B packet of its stream
    fn fill_pts_from_lookahead(&mut self) {
        let Some(head) = self.reorder_buffer.front() else {
            return;
        };
        let Some(head_dts) = head.dts.get() else {
            return;
        };
        if head.pts.is_valid() {
            return;
        }
        let stream = head.stream_index;
        let modulus = wrap_modulus(self.streams[stream].info.wrap_bits);

        let next_dts = self
            .reorder_buffer
            .iter()
            .skip(1)
            .find(|p| {
                p.stream_index == stream
                    && p.dts.is_valid()
                    && compare_mod(head_dts, p.dts.value, modulus) < 0
                    && compare_mod(p.pts.value, p.dts.value, modulus) != 0
            })
            .map(|p| p.dts);

        if let (Some(dts), Some(head)) = (next_dts, self.reorder_buffer.front_mut()) {
            head.pts = dts;
        }
    }

    /// Drop every buffered packet and all in-flight reconciliation state
    pub fn flush(&mut self) {
        self.raw_buffer.flush();
        self.parse_queue.flush();
        self.reorder_buffer.flush();
        let max_probe_packets = self.options.max_probe_packets;
        for st in &mut self.streams {
            st.reset_read_state(max_probe_packets);
        }
    }

    /// Move every stream's expected dts to `timestamp`, given in the time base of `ref_stream`
    pub fn update_cur_dts(&mut self, ref_stream: usize, timestamp: i64) {
        let Some(ref_tb) = self.streams.get(ref_stream).map(|st| st.time_base()) else {
            return;
        };
        for st in &mut self.streams {
            let tb = st.time_base();
            st.cur_dts = Timestamp::new(rescale(
                timestamp,
                tb.den * ref_tb.num,
                tb.num * ref_tb.den,
            ));
        }
    }

    /// First non-cover video stream, else the first audio stream, else 0
    pub fn find_default_stream_index(&self) -> usize {
        let mut first_audio = None;
        for st in &self.streams {
            if st.media_type() == MediaType::Video && !st.info.disposition.attached_pic {
                return st.index;
            }
            if first_audio.is_none() && st.media_type() == MediaType::Audio {
                first_audio = Some(st.index);
            }
        }
        first_audio.unwrap_or(0)
    }

    /// Stream of `media_type` with the most inferred frames.
    ///
    /// `wanted` restricts the choice to one stream index. Streams flagged for
    /// hearing or visually impaired audiences are skipped.
    pub fn find_best_stream(&self, media_type: MediaType, wanted: Option<usize>) -> Result<usize> {
        let mut best: Option<(usize, u64)> = None;
        for st in &self.streams {
            if st.media_type() != media_type {
                continue;
            }
            if wanted.is_some_and(|w| w != st.index) {
                continue;
            }
            let disposition = st.info.disposition;
            if disposition.hearing_impaired || disposition.visual_impaired {
                continue;
            }
            if best.is_some_and(|(_, count)| count >= st.codec_info_nb_frames) {
                continue;
            }
            best = Some((st.index, st.codec_info_nb_frames));
        }
        best.map(|(index, _)| index)
            .ok_or_else(|| Error::not_found(format!("no {} stream", media_type)))
    }

    /// Seek so that the next frame read is near `timestamp`.
    ///
    /// With `stream` unset, `timestamp` is in microseconds and the default
    /// stream is used. Otherwise it is in that stream's time base. On failure
    /// the reader is put back where unread data starts, so sequential reading
    /// can continue.
    pub fn seek_frame(&mut self, stream: Option<usize>, timestamp: i64, flags: SeekFlags) -> Result<()> {
        if let Some(idx) = stream {
            if idx >= self.streams.len() {
                return Err(Error::invalid_input(format!("no stream {}", idx)));
            }
        }

        let resume_pos = self.resume_position();
        match self.seek_frame_internal(stream, timestamp, flags) {
            Ok(()) => self.queue_attached_pictures(),
            Err(err) => {
                debug!("Seek to {} failed: {}", timestamp, err);
                if let Err(e) = self.io.seek(SeekFrom::Start(resume_pos)) {
                    warn!("Could not restore read position {}: {}", resume_pos, e);
                }
                self.flush();
                Err(err)
            }
        }
    }

    /// Seek to `ts`, accepting any landing point in `[min_ts, max_ts]`
    pub fn seek_file(
        &mut self,
        stream: Option<usize>,
        min_ts: i64,
        ts: i64,
        max_ts: i64,
        flags: SeekFlags,
    ) -> Result<()> {
        if min_ts > ts || max_ts < ts {
            return Err(Error::invalid_input(format!(
                "seek target {} outside [{}, {}]",
                ts, min_ts, max_ts
            )));
        }
        let backward = (ts as u64).wrapping_sub(min_ts as u64) > (max_ts as u64).wrapping_sub(ts as u64);
        self.seek_frame(stream, ts, flags.with_backward(flags.backward || backward))
    }

    fn resume_position(&mut self) -> u64 {
        let buffered = [&self.raw_buffer, &self.parse_queue, &self.reorder_buffer]
            .iter()
            .filter_map(|q| q.min_position())
            .min();
        match buffered {
            Some(pos) => pos as u64,
            None => self
                .io
                .stream_position()
                .unwrap_or(self.data_offset.max(0) as u64),
        }
    }

    fn seek_frame_internal(&mut self, stream: Option<usize>, timestamp: i64, flags: SeekFlags) -> Result<()> {
        let format_flags = self.format.info().flags;

        if flags.byte {
            if format_flags.no_byte_seek {
                return Err(Error::unsupported("format does not support byte seeking"));
            }
            self.flush();
            let pos = seek::byte_seek_target(timestamp, self.data_offset, self.file_size);
            self.io.seek(SeekFrom::Start(pos as u64))?;
            return Ok(());
        }

        if self.streams.is_empty() {
            return Err(Error::not_found("input has no streams"));
        }
        let (idx, ts) = match stream {
            Some(idx) => (idx, timestamp),
            None => {
                let idx = self.find_default_stream_index();
                let tb = self.streams[idx].time_base();
                (idx, rescale(timestamp, tb.den, TIME_BASE_US * tb.num))
            }
        };

        self.flush();
        match self.demuxer.read_seek(&mut *self.io, idx, ts, flags) {
            Ok(()) => return Ok(()),
            Err(err) if err.is_unsupported() => {}
            Err(err) => return Err(err),
        }

        if !format_flags.no_bin_search {
            self.flush();
            match self.seek_frame_binary(idx, ts, flags) {
                Err(err) if err.is_unsupported() => {}
                other => return other,
            }
        }

        if !format_flags.no_gen_search {
            self.flush();
            return self.seek_frame_generic(idx, ts, flags);
        }
        Err(Error::unsupported("format cannot seek"))
    }

    /// Search byte positions with the reader's timestamp probe
    fn seek_frame_binary(&mut self, idx: usize, target: i64, flags: SeekFlags) -> Result<()> {
        let bounds = SearchBounds::from_index(&self.streams[idx].index_entries, target, flags);
        let (data_offset, file_size) = (self.data_offset, self.file_size);
        let demuxer = &mut self.demuxer;
        let io = &mut self.io;

        let (pos, ts) = seek::generic_seek(target, bounds, data_offset, file_size, flags, |pos, limit| {
            demuxer.read_timestamp(&mut **io, idx, pos, limit)
        })?;
        trace!("timestamp search for {} landed at pos {} ts {}", target, pos, ts);

        self.io.seek(SeekFrom::Start(pos.max(0) as u64))?;
        self.update_cur_dts(idx, ts);
        Ok(())
    }

    /// Seek through the index, reading forward to extend it when the target lies beyond it
    fn seek_frame_generic(&mut self, idx: usize, target: i64, flags: SeekFlags) -> Result<()> {
        let mut found = self.streams[idx].index_entries.search(target, flags);

        if found.is_none() {
            if let Some(first) = self.streams[idx].index_entries.first() {
                if target < first.timestamp {
                    return Err(Error::not_found(format!(
                        "timestamp {} is before the first index entry",
                        target
                    )));
                }
            }
        }

        let last = self.streams[idx].index_entries.len().checked_sub(1);
        if found.is_none() || found == last {
            match self.streams[idx].index_entries.last().copied() {
                Some(entry) => {
                    self.io.seek(SeekFrom::Start(entry.pos.max(0) as u64))?;
                    self.update_cur_dts(idx, entry.timestamp);
                }
                None => {
                    self.io.seek(SeekFrom::Start(self.data_offset.max(0) as u64))?;
                }
            }

            loop {
                let pkt = match self.read_frame() {
                    Ok(pkt) => pkt,
                    Err(err) if err.is_retry() => continue,
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(_) => break,
                };
                if pkt.stream_index == idx
                    && pkt.is_keyframe()
                    && pkt.dts.get().is_some_and(|dts| dts > target)
                {
                    break;
                }
            }
            found = self.streams[idx].index_entries.search(target, flags);
        }

        let entry = found
            .and_then(|i| self.streams[idx].index_entries.get(i).copied())
            .ok_or_else(|| Error::not_found(format!("no seek point for timestamp {}", target)))?;

        self.flush();
        self.io.seek(SeekFrom::Start(entry.pos.max(0) as u64))?;
        self.update_cur_dts(idx, entry.timestamp);
        Ok(())
    }

    /// Infer missing codec parameters and frame rates by reading ahead.
    ///
    /// Packets read here stay buffered and are returned by [`read_frame`](Self::read_frame).
    pub fn find_stream_info(&mut self) -> Result<StreamInfoReport> {
        StreamAnalyzer::new(self).run()
    }

    /// Flush all state and close the reader
    pub fn close(mut self) -> Result<()> {
        self.flush();
        self.demuxer.close()
    }
}

/// `2^wrap_bits`, with 0 standing for 2^64
fn wrap_modulus(wrap_bits: u32) -> u64 {
    1u64.checked_shl(wrap_bits).unwrap_or(0)
}

fn log2(n: usize) -> u32 {
    if n == 0 {
        0
    } else {
        n.ilog2()
    }
}

impl fmt::Debug for DemuxerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DemuxerContext")
            .field("format", &self.format.info().name)
            .field("filename", &self.filename)
            .field("streams", &self.streams)
            .field("data_offset", &self.data_offset)
            .field("raw_buffer", &self.raw_buffer.len())
            .field("parse_queue", &self.parse_queue.len())
            .field("reorder_buffer", &self.reorder_buffer.len())
            .finish()
    }
}

impl fmt::Display for DemuxerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Input #0, {}, from '{}':", self.format.info().name, self.filename)?;
        write!(f, "  Duration: ")?;
        match self.duration.get() {
            Some(us) => {
                let secs = us as f64 / TIME_BASE_US as f64;
                let hours = (secs / 3600.0) as u32;
                let minutes = ((secs % 3600.0) / 60.0) as u32;
                write!(f, "{:02}:{:02}:{:05.2}", hours, minutes, secs % 60.0)?;
            }
            None => write!(f, "N/A")?,
        }
        if let Some(start) = self.start_time.get() {
            write!(f, ", start: {:.6}", start as f64 / TIME_BASE_US as f64)?;
        }
        if self.bit_rate > 0 {
            write!(f, ", bitrate: {} kb/s", self.bit_rate / 1000)?;
        }
        writeln!(f)?;
        for st in &self.streams {
            writeln!(f, "    {}", st)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_modulus() {
        assert_eq!(wrap_modulus(33), 1 << 33);
        assert_eq!(wrap_modulus(64), 0);
        assert!(compare_mod(5, 3, wrap_modulus(64)) > 0);
        assert!(compare_mod(1, (1 << 33) - 1, wrap_modulus(33)) > 0);
    }

    #[test]
    fn test_log2() {
        assert_eq!(log2(0), 0);
        assert_eq!(log2(1), 0);
        assert_eq!(log2(2048), 11);
        assert_eq!(log2(4095), 11);
    }
}
