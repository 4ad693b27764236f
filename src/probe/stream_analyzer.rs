//! Stream-info inference
//!
//! Containers often leave codec parameters or frame rates unstated. The
//! analyzer reads packets through the whole demuxing pipeline until every
//! stream is described, the probe budget runs out or the input ends:
//!
//! - streams missing parameters are trial-decoded; decoders fill in
//!   [`CodecParameters`] as a side effect
//! - parsers able to split out-of-band headers get the chance to set extradata
//! - packet dts deltas are matched against the standard frame rates to derive
//!   `avg_frame_rate` and `r_frame_rate`
//!
//! Every packet read here stays buffered on the context, so the caller still
//! sees the whole input from [`read_frame`](crate::format::DemuxerContext::read_frame).

use super::report::StreamInfoReport;
use super::timing::estimate_timings;
use crate::codec::{CodecId, CodecParameters, Decoder, DecoderOptions};
use crate::error::{Error, Result};
use crate::format::splitter::{parser_flags, Splitter};
use crate::format::DemuxerContext;
use crate::util::{gcd, rescale_q, MediaType, Rational, Timestamp, TIME_BASE_US};
use tracing::{debug, trace, warn};

/// Number of candidate frame rates tried when snapping measured rates
pub const MAX_STD_TIMEBASES: usize = 30 * 12 + 30 + 3 + 6 + 326;

/// Extradata larger than this is never accepted from a parser
const MAX_EXTRADATA_SIZE: usize = (1 << 28) - 32;

/// Frames H.264 streams are decoded for even once parameters are known,
/// so delayed-output settings settle
const H264_MIN_DECODED_FRAMES: u64 = 6;

/// Candidate frame rate `i`, scaled by 12 * 1001.
///
/// Indices below 720 cover every multiple of 1/12 fps up to 60; the tail
/// covers the NTSC rates 24, 30, 60, 12 and 15 times 1000/1001.
pub fn get_std_framerate(i: usize) -> i64 {
    const NTSC: [i64; 5] = [24, 30, 60, 12, 15];
    if i < 720 {
        i as i64 * 1001
    } else {
        NTSC.get(i - 720).map_or(0, |base| base * 1000 * 12)
    }
}

/// Whether `codec` carries everything a decoder needs.
///
/// Sample and pixel formats are only required when `decoder_usable`, since
/// without a decoder nothing could ever supply them.
pub fn has_codec_parameters(codec: &CodecParameters, decoder_usable: bool) -> bool {
    if matches!(codec.codec_id, CodecId::None | CodecId::Probe) {
        return false;
    }
    match codec.media_type {
        MediaType::Audio => {
            codec.sample_rate > 0
                && codec.channels > 0
                && !(decoder_usable && codec.sample_fmt.is_none())
        }
        MediaType::Video => codec.width > 0 && !(decoder_usable && codec.pix_fmt.is_none()),
        _ => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    Untried,
    Open,
    Unavailable,
}

/// Per-stream measurements collected while reading ahead
struct AnalysisState {
    decoder_state: DecoderState,
    decoder: Option<Box<dyn Decoder>>,
    nb_decoded_frames: u64,
    fps_first_dts: Timestamp,
    fps_first_dts_idx: u64,
    fps_last_dts: Timestamp,
    fps_last_dts_idx: u64,
    last_dts: Timestamp,
    duration_count: u64,
    duration_gcd: i64,
    duration_error: Vec<f64>,
}

impl AnalysisState {
    fn new() -> Self {
        AnalysisState {
            decoder_state: DecoderState::Untried,
            decoder: None,
            nb_decoded_frames: 0,
            fps_first_dts: Timestamp::none(),
            fps_first_dts_idx: 0,
            fps_last_dts: Timestamp::none(),
            fps_last_dts_idx: 0,
            last_dts: Timestamp::none(),
            duration_count: 0,
            duration_gcd: 0,
            duration_error: vec![0.0; MAX_STD_TIMEBASES],
        }
    }

    fn decoder_usable(&self) -> bool {
        self.decoder_state != DecoderState::Unavailable
    }

    fn reset_fps_window(&mut self) {
        self.fps_first_dts = Timestamp::none();
        self.fps_last_dts = Timestamp::none();
    }
}

/// Drives stream-info inference over an open [`DemuxerContext`]
pub struct StreamAnalyzer<'a> {
    ctx: &'a mut DemuxerContext,
    states: Vec<AnalysisState>,
}

impl<'a> StreamAnalyzer<'a> {
    pub fn new(ctx: &'a mut DemuxerContext) -> Self {
        StreamAnalyzer {
            ctx,
            states: Vec::new(),
        }
    }

    /// Read ahead until every stream is described, then fill in timings
    pub fn run(mut self) -> Result<StreamInfoReport> {
        for idx in 0..self.ctx.streams.len() {
            self.prepare_stream(idx);
        }

        let result = self.read_ahead();
        self.close_decoders();
        result?;

        self.finish_frame_rates();
        estimate_timings(self.ctx);

        for st in &self.ctx.streams {
            debug!("{}", st);
        }
        Ok(StreamInfoReport::from_context(self.ctx))
    }

    /// Attach a parser and open a decoder for a stream before reading starts
    fn prepare_stream(&mut self, idx: usize) {
        let mut state = AnalysisState::new();
        let codecs = self.ctx.codecs.clone();
        let no_parse = self.ctx.options.flags.no_parse;
        let st = &mut self.ctx.streams[idx];

        if !st.has_parser() && !no_parse {
            if let Some(backend) = codecs.create_parser(st.info.codec.codec_id) {
                st.parser = Some(Splitter::new(backend, parser_flags(st.info.need_parsing)));
            }
        }

        if !has_codec_parameters(&st.info.codec, true) {
            if let Some(mut decoder) = codecs.create_decoder(st.info.codec.codec_id) {
                match decoder.open(&mut st.info.codec, &DecoderOptions { threads: 1 }) {
                    Ok(()) => state.decoder = Some(decoder),
                    Err(e) => warn!("Failed to open decoder for stream {}: {}", idx, e),
                }
            }
        }

        self.states.push(state);
    }

    fn sync_states(&mut self) {
        while self.states.len() < self.ctx.streams.len() {
            let idx = self.states.len();
            self.prepare_stream(idx);
        }
    }

    fn frame_rate_probe_count(&self, idx: usize) -> u64 {
        if let Some(count) = self.ctx.options.fps_probe_size {
            return count as u64;
        }
        if self.ctx.streams[idx].time_base().to_f64() > 0.0005 {
            40
        } else {
            20
        }
    }

    fn stream_done(&self, idx: usize) -> bool {
        let st = &self.ctx.streams[idx];
        let codec = &st.info.codec;
        if !has_codec_parameters(codec, self.states[idx].decoder_usable()) {
            return false;
        }
        if codec.time_base_unreliable()
            && st.info.avg_frame_rate.num == 0
            && st.codec_info_nb_frames < self.frame_rate_probe_count(idx)
            && codec.media_type == MediaType::Video
        {
            return false;
        }
        if st.parser.as_ref().is_some_and(|p| p.can_split()) && codec.extradata.is_none() {
            return false;
        }
        if st.first_dts.is_none() && matches!(codec.media_type, MediaType::Video | MediaType::Audio)
        {
            return false;
        }
        true
    }

    fn read_ahead(&mut self) -> Result<()> {
        let mut read_size: u64 = 0;
        let no_header = self.ctx.format_info().flags.no_header;

        loop {
            self.ctx.check_interrupt()?;

            let all_done = (0..self.ctx.streams.len()).all(|idx| self.stream_done(idx));
            if all_done && !no_header {
                debug!("All info found");
                return Ok(());
            }
            if read_size >= self.ctx.options.probe_size {
                debug!("Probe buffer size limit of {} bytes reached", self.ctx.options.probe_size);
                return Ok(());
            }

            let pkt = match self.ctx.read_frame_internal() {
                Ok(pkt) => pkt,
                Err(e) if e.is_retry() => continue,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    debug!("Input ended during stream analysis: {}", e);
                    self.drain_decoders();
                    return Ok(());
                }
            };
            self.sync_states();

            let idx = pkt.stream_index;
            let dts = pkt.dts;
            let data = pkt.data.clone();
            read_size += pkt.size() as u64;
            if !self.ctx.options.flags.no_buffer {
                self.ctx.reorder_buffer.push(pkt)?;
            }

            if self.track_frame_rate(idx, dts) {
                return Ok(());
            }
            self.track_durations(idx, dts);
            self.split_extradata(idx, data.as_slice());

            if let Err(e) = self.try_decode(idx, data.as_slice()) {
                trace!("trial decode of stream {} failed: {}", idx, e);
            }
            self.ctx.streams[idx].codec_info_nb_frames += 1;
        }
    }

    /// Update the dts window used for the average frame rate.
    ///
    /// Returns true once the window spans the analysis duration limit.
    fn track_frame_rate(&mut self, idx: usize, dts: Timestamp) -> bool {
        let st = &self.ctx.streams[idx];
        let Some(dts) = dts.get() else {
            return false;
        };
        if st.codec_info_nb_frames <= 1 {
            return false;
        }
        let frame = st.codec_info_nb_frames;
        let time_base = st.time_base();
        let state = &mut self.states[idx];

        if state.fps_last_dts.get().is_some_and(|last| last >= dts) {
            warn!(
                "Non-increasing DTS in stream {}: packet {} with DTS {}, packet {} with DTS {}",
                idx, state.fps_last_dts_idx, state.fps_last_dts, frame, dts
            );
            state.reset_fps_window();
        }

        if let (Some(first), Some(last)) = (state.fps_first_dts.get(), state.fps_last_dts.get()) {
            if state.fps_last_dts_idx > state.fps_first_dts_idx {
                let span = (state.fps_last_dts_idx - state.fps_first_dts_idx) as i64;
                if (dts - last) / 1000 > (last - first) / span {
                    warn!(
                        "DTS discontinuity in stream {}: packet {} with DTS {}, packet {} with DTS {}",
                        idx, state.fps_last_dts_idx, last, frame, dts
                    );
                    state.reset_fps_window();
                }
            }
        }

        if state.fps_first_dts.is_none() {
            state.fps_first_dts = Timestamp::new(dts);
            state.fps_first_dts_idx = frame;
        }
        state.fps_last_dts = Timestamp::new(dts);
        state.fps_last_dts_idx = frame;

        let first = state.fps_first_dts.value;
        let analyzed = rescale_q(dts - first, time_base, Rational::new(1, TIME_BASE_US));
        if analyzed >= self.ctx.options.max_analyze_duration {
            warn!("max_analyze_duration {} reached", self.ctx.options.max_analyze_duration);
            return true;
        }
        false
    }

    /// Accumulate how far each dts delta is from every candidate frame rate
    fn track_durations(&mut self, idx: usize, dts: Timestamp) {
        let time_base = self.ctx.streams[idx].time_base().to_f64();
        let state = &mut self.states[idx];

        if let (Some(dts), Some(last)) = (dts.get(), state.last_dts.get()) {
            if dts > last {
                let duration = dts - last;
                let dur = duration as f64 * time_base;

                if state.duration_count < 2 {
                    state.duration_error.iter_mut().for_each(|e| *e = 0.0);
                }
                for i in 1..MAX_STD_TIMEBASES {
                    let framerate = get_std_framerate(i) as f64;
                    let ticks = (dur * framerate / (1001.0 * 12.0)).round();
                    let error = dur - ticks * 1001.0 * 12.0 / framerate;
                    state.duration_error[i] += error * error;
                }
                state.duration_count += 1;
                if state.duration_count > 3 {
                    state.duration_gcd = gcd(state.duration_gcd, duration);
                }
            }
        }

        if state.last_dts.is_none() || state.duration_count <= 1 {
            state.last_dts = dts;
        }
    }

    fn split_extradata(&mut self, idx: usize, data: &[u8]) {
        let st = &mut self.ctx.streams[idx];
        if st.info.codec.extradata.is_some() {
            return;
        }
        let Some(parser) = st.parser.as_ref() else {
            return;
        };
        if let Some(len) = parser.split(&st.info.codec, data) {
            if len < MAX_EXTRADATA_SIZE {
                debug!("Extracted {} bytes of extradata for stream {}", len, idx);
                st.info.codec.extradata = Some(data[..len].to_vec());
            }
        }
    }

    /// Feed `data` to the stream's trial decoder while parameters are missing.
    ///
    /// Empty `data` drains delayed frames. Returns whether the last decode call
    /// produced a frame.
    fn try_decode(&mut self, idx: usize, data: &[u8]) -> Result<bool> {
        let st = &mut self.ctx.streams[idx];
        let state = &mut self.states[idx];

        if state.decoder.is_none() && state.decoder_state == DecoderState::Untried {
            let Some(mut decoder) = self.ctx.codecs.create_decoder(st.info.codec.codec_id) else {
                state.decoder_state = DecoderState::Unavailable;
                return Err(Error::codec(format!("no decoder for {}", st.info.codec.codec_id)));
            };
            if let Err(e) = decoder.open(&mut st.info.codec, &DecoderOptions { threads: 1 }) {
                state.decoder_state = DecoderState::Unavailable;
                return Err(e);
            }
            state.decoder = Some(decoder);
        }
        if state.decoder.is_some() && state.decoder_state == DecoderState::Untried {
            state.decoder_state = DecoderState::Open;
        }
        let Some(decoder) = state.decoder.as_mut() else {
            return Err(Error::codec(format!("no decoder for stream {}", idx)));
        };
        if !matches!(st.info.codec.media_type, MediaType::Video | MediaType::Audio) {
            return Ok(false);
        }

        let channel_conf = decoder.capabilities().channel_conf;
        let draining = data.is_empty();
        let mut rest = data;
        let mut got_output = true;
        let mut produced = false;

        loop {
            let codec = &st.info.codec;
            let wants_frames = !has_codec_parameters(codec, true)
                || (codec.codec_id == CodecId::H264 && state.nb_decoded_frames < H264_MIN_DECODED_FRAMES)
                || (st.codec_info_nb_frames == 0 && channel_conf);
            let has_input = !rest.is_empty() || (draining && got_output);
            if !has_input || !wants_frames {
                break;
            }

            let status = decoder.decode(&mut st.info.codec, rest)?;
            got_output = status.got_output;
            produced = got_output;
            if got_output {
                state.nb_decoded_frames += 1;
            }
            let consumed = status.consumed.min(rest.len());
            if !draining && consumed == 0 && !got_output {
                break;
            }
            rest = &rest[consumed..];
        }
        Ok(produced)
    }

    /// Flush delayed frames out of every open decoder after the input ended
    fn drain_decoders(&mut self) {
        for idx in 0..self.ctx.streams.len() {
            let mut result: Result<bool> = Ok(false);
            if self.states[idx].decoder_state == DecoderState::Open {
                loop {
                    result = self.try_decode(idx, &[]);
                    let has_params = has_codec_parameters(&self.ctx.streams[idx].info.codec, true);
                    if !matches!(result, Ok(true)) || has_params {
                        break;
                    }
                }
            }

            let st = &self.ctx.streams[idx];
            match result {
                Err(e) => warn!("decoding for stream {} failed: {}", idx, e),
                Ok(_) if !has_codec_parameters(&st.info.codec, self.states[idx].decoder_usable()) => {
                    warn!("Could not find codec parameters for stream {} ({})", idx, st);
                }
                Ok(_) => {}
            }
        }
    }

    fn close_decoders(&mut self) {
        for state in &mut self.states {
            if let Some(mut decoder) = state.decoder.take() {
                decoder.close();
            }
        }
    }

    /// Turn the collected measurements into frame rates and audio defaults
    fn finish_frame_rates(&mut self) {
        for (st, state) in self.ctx.streams.iter_mut().zip(&self.states) {
            let codec = &mut st.info.codec;
            match codec.media_type {
                MediaType::Audio => {
                    if codec.bits_per_coded_sample == 0 {
                        codec.bits_per_coded_sample = codec.codec_id.bits_per_sample();
                    }
                    continue;
                }
                MediaType::Video => {}
                _ => continue,
            }

            let time_base = st.info.time_base;
            if st.info.avg_frame_rate.num == 0 {
                if let Some(rate) = average_frame_rate(state, time_base) {
                    st.info.avg_frame_rate = rate;
                }
            }

            let unreliable = codec.time_base_unreliable();
            if unreliable
                && state.duration_count > 15
                && state.duration_gcd > 1
                && st.info.r_frame_rate.num == 0
            {
                st.info.r_frame_rate = Rational::reduce_with_limit(
                    time_base.den,
                    time_base.num * state.duration_gcd,
                    i32::MAX as i64,
                )
                .0;
            }

            if state.duration_count > 0 && st.info.r_frame_rate.num == 0 && unreliable {
                if let Some(num) = best_std_framerate(state, time_base) {
                    st.info.r_frame_rate =
                        Rational::reduce_with_limit(num, 12 * 1001, i32::MAX as i64).0;
                }
            }

            trace!(
                "stream {}: avg_frame_rate {} r_frame_rate {}",
                st.index,
                st.info.avg_frame_rate,
                st.info.r_frame_rate
            );
        }
    }
}

/// Frames per dts across the measurement window, snapped to a standard rate
/// when one lies within 1%
fn average_frame_rate(state: &AnalysisState, time_base: Rational) -> Option<Rational> {
    let first = state.fps_first_dts.get()?;
    let last = state.fps_last_dts.get()?;
    if last <= first || state.fps_last_dts_idx <= state.fps_first_dts_idx {
        return None;
    }
    let delta_dts = last - first;
    let delta_packets = (state.fps_last_dts_idx - state.fps_first_dts_idx) as i64;

    let num = delta_packets.checked_mul(time_base.den)?;
    let den = delta_dts.checked_mul(time_base.num)?;
    let (measured, _) = Rational::reduce_with_limit(num, den, 60000);
    if measured.is_zero() {
        return None;
    }

    let mut best_fps = 0;
    let mut best_error = 0.01;
    for j in 1..MAX_STD_TIMEBASES {
        let candidate = get_std_framerate(j) as f64 / (12.0 * 1001.0);
        let error = (measured.to_f64() / candidate - 1.0).abs();
        if error < best_error {
            best_error = error;
            best_fps = get_std_framerate(j);
        }
    }

    if best_fps > 0 {
        Some(Rational::reduce_with_limit(best_fps, 12 * 1001, i32::MAX as i64).0)
    } else {
        Some(measured)
    }
}

/// Standard frame rate whose tick grid fits the observed dts deltas best
fn best_std_framerate(state: &AnalysisState, time_base: Rational) -> Option<i64> {
    let tb = time_base.to_f64();
    let mut best_error = (2.0 * tb) * (2.0 * tb) * state.duration_count as f64 * 1000.0 * 12.0 * 30.0;
    let mut best = None;

    for j in 1..MAX_STD_TIMEBASES {
        let num = get_std_framerate(j);
        let error = state.duration_error[j] * num as f64;
        if error < best_error {
            best_error = error;
            best = Some(num);
        }
    }
    best
}
