//! Timestamp reconciliation
//!
//! Containers rarely carry both pts and dts for every packet. The reconciler
//! fills in whatever is missing from stream state (frame durations, the last
//! displayed reference frame, a small window of recent pts values) and keeps
//! each stream's expected next dts up to date. All state lives on [`Stream`].

use super::queue::PacketQueue;
use super::splitter::SplitFrame;
use super::stream::{NeedParsing, Stream, MAX_REORDER_DELAY};
use super::options::DemuxFlags;
use super::Packet;
use crate::codec::{CodecId, DtsSync, PictureType};
use crate::util::{rescale, rescale_rnd, MediaType, Rounding, Timestamp};
use tracing::debug;

/// What the splitter learned about a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameHints {
    pub pict_type: PictureType,
    pub repeat_pict: i32,
    /// Bytes between the start of the timestamped packet and the frame start
    pub offset: i64,
    pub dts_sync: Option<DtsSync>,
}

impl FrameHints {
    pub fn from_frame(frame: &SplitFrame) -> Self {
        FrameHints {
            pict_type: frame.pict_type,
            repeat_pict: frame.repeat_pict,
            offset: frame.offset,
            dts_sync: frame.dts_sync,
        }
    }
}

/// Fills in missing packet timestamps and durations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimestampReconciler {
    /// Ignore container dts whenever pts is present
    pub ign_dts: bool,
    /// Leave timestamps alone
    pub no_fill_in: bool,
    /// Pts generation is on; overrides `no_fill_in`
    pub gen_pts: bool,
}

impl TimestampReconciler {
    pub fn new(flags: &DemuxFlags) -> Self {
        TimestampReconciler {
            ign_dts: flags.ign_dts,
            no_fill_in: flags.no_fill_in,
            gen_pts: flags.gen_pts,
        }
    }

    /// Complete the timing of `pkt`, a packet of `st` about to be handed out.
    ///
    /// `hints` is present for packets produced by a splitter. `pending` holds
    /// packets already delivered to the read-ahead buffer; their timestamps are
    /// patched once the stream's timestamp origin becomes known.
    pub fn reconcile(
        &self,
        st: &mut Stream,
        pkt: &mut Packet,
        hints: Option<&FrameHints>,
        pending: &mut PacketQueue,
    ) {
        if self.no_fill_in && !self.gen_pts {
            return;
        }

        if self.ign_dts && pkt.pts.is_valid() {
            pkt.dts = Timestamp::none();
        }

        let delay = st.codec().has_b_frames as usize;
        let media_type = st.media_type();
        let codec_id = st.codec().codec_id;

        let mut presentation_delayed =
            delay > 0 && hints.map_or(false, |h| h.pict_type != PictureType::B);

        if let (Some(pts), Some(dts)) = (pkt.pts.get(), pkt.dts.get()) {
            let wrap_bits = st.info.wrap_bits;
            if (1..63).contains(&wrap_bits) && dts - (1i64 << (wrap_bits - 1)) > pts {
                pkt.dts = Timestamp::new(dts - (1i64 << wrap_bits));
            } else if dts > pts {
                // decoded after it is shown; the reorder window supplies a dts
                debug!(stream = st.index, pts, dts, "dropping dts ahead of pts");
                pkt.dts = Timestamp::none();
            }
        }

        if delay == 1 && pkt.dts.is_valid() && pkt.dts == pkt.pts && presentation_delayed {
            debug!(stream = st.index, dts = pkt.dts.value, "invalid dts/pts combination");
            pkt.pts = Timestamp::none();
            pkt.dts = Timestamp::none();
        }

        if pkt.duration == 0 && media_type != MediaType::Audio {
            if let Some(duration) = frame_duration(st, hints, pkt.size()) {
                pkt.duration = duration;
                if duration != 0 && !pending.is_empty() {
                    update_initial_durations(st, duration, pending);
                }
            }
        }

        if let Some(h) = hints {
            if st.info.need_parsing == NeedParsing::Timestamps && pkt.size() > 0 {
                let offset = rescale(h.offset, pkt.duration, pkt.size() as i64);
                pkt.pts = pkt.pts.offset(offset);
                pkt.dts = pkt.dts.offset(offset);
            }
        }

        if let Some(sync) = hints.and_then(|h| h.dts_sync) {
            apply_dts_sync(st, pkt, &sync);
        }

        if let (Some(pts), Some(dts)) = (pkt.pts.get(), pkt.dts.get()) {
            if pts > dts {
                presentation_delayed = true;
            }
        }

        // H.264 does not report a reliable delay
        let interpolate =
            (delay == 0 || (delay == 1 && hints.is_some())) && codec_id != CodecId::H264;
        if interpolate {
            if presentation_delayed {
                if pkt.dts.is_none() {
                    pkt.dts = st.last_ip_pts;
                }
                update_initial_timestamps(st, pkt.dts, pkt.pts, pending);
                if pkt.dts.is_none() {
                    pkt.dts = st.cur_dts;
                }

                // dts advances by the duration of the frame being displayed
                if st.last_ip_duration == 0 {
                    st.last_ip_duration = pkt.duration;
                }
                if pkt.dts.is_valid() {
                    st.cur_dts = pkt.dts.offset(st.last_ip_duration);
                }
                st.last_ip_duration = pkt.duration;
                st.last_ip_pts = pkt.pts;
            } else if pkt.pts.is_valid()
                || pkt.dts.is_valid()
                || pkt.duration != 0
                || media_type == MediaType::Audio
            {
                let mut duration = pkt.duration;
                if duration == 0 && media_type == MediaType::Audio {
                    if let Some(d) = frame_duration(st, hints, pkt.size()) {
                        duration = d;
                        if d != 0 && !pending.is_empty() {
                            update_initial_durations(st, d, pending);
                        }
                    }
                }

                if pkt.pts.is_valid() || pkt.dts.is_valid() || duration != 0 {
                    if pkt.pts.is_none() {
                        pkt.pts = pkt.dts;
                    }
                    update_initial_timestamps(st, pkt.pts, pkt.pts, pending);
                    if pkt.pts.is_none() {
                        pkt.pts = st.cur_dts;
                    }
                    pkt.dts = pkt.pts;
                    if pkt.pts.is_valid() {
                        st.cur_dts = pkt.pts.offset(duration);
                    }
                }
            }
        }

        if pkt.pts.is_valid() && delay <= MAX_REORDER_DELAY {
            let window = &mut st.pts_buffer;
            window[0] = pkt.pts;
            let mut i = 0;
            while i < delay && window[i].value > window[i + 1].value {
                window.swap(i, i + 1);
                i += 1;
            }
            if pkt.dts.is_none() {
                pkt.dts = reorder_head(&window[..=delay]);
            }
            if codec_id == CodecId::H264 {
                update_initial_timestamps(st, pkt.dts, pkt.pts, pending);
            }
            if pkt.dts.value > st.cur_dts.value {
                st.cur_dts = pkt.dts;
            }
        }

        if codec_id.is_intra_only() {
            pkt.set_keyframe(true);
        }
    }
}

/// Dts implied by the reorder window.
///
/// Until the window is primed the head is unknown; the smallest known pts
/// stands in for it so the first dts matches the first presented frame.
fn reorder_head(window: &[Timestamp]) -> Timestamp {
    window
        .iter()
        .copied()
        .find(|ts| ts.is_valid())
        .unwrap_or_else(Timestamp::none)
}

fn apply_dts_sync(st: &mut Stream, pkt: &mut Packet, sync: &DtsSync) {
    let codec_tb = st.codec().time_base;
    let tb = st.time_base();
    let den = codec_tb.den * tb.num;
    if den <= 0 {
        return;
    }
    let num = codec_tb.num * tb.den;

    if pkt.dts.is_valid() {
        st.reference_dts = pkt.dts.offset(-(sync.dts_ref_dts_delta * num / den));
        pkt.pts = pkt.dts.offset(sync.pts_dts_delta * num / den);
    } else if st.reference_dts.is_valid() {
        pkt.dts = st.reference_dts.offset(sync.dts_ref_dts_delta * num / den);
        pkt.pts = pkt.dts.offset(sync.pts_dts_delta * num / den);
    }
    if sync.sync_point > 0 {
        st.reference_dts = pkt.dts;
    }
}

/// Frame duration of a packet as a `num/den` seconds fraction
pub fn compute_frame_duration(
    st: &Stream,
    hints: Option<&FrameHints>,
    size: usize,
) -> Option<(i64, i64)> {
    let codec = st.codec();
    let (num, den) = match codec.media_type {
        MediaType::Video => {
            let rate = st.info.avg_frame_rate;
            let tb = st.time_base();
            let codec_tb = codec.time_base;
            if rate.num != 0 {
                (rate.den, rate.num)
            } else if tb.num * 1000 > tb.den {
                (tb.num, tb.den)
            } else if codec_tb.num * 1000 > codec_tb.den {
                // interlaced-capable codecs need a parser to know the field count
                if codec.ticks_per_frame > 1 && hints.is_none() {
                    return None;
                }
                let repeat = 1 + hints.map_or(0, |h| h.repeat_pict.max(0) as i64);
                if codec_tb.num > i32::MAX as i64 / repeat {
                    (codec_tb.num, codec_tb.den / repeat)
                } else {
                    (codec_tb.num * repeat, codec_tb.den)
                }
            } else {
                return None;
            }
        }
        MediaType::Audio => {
            let samples = codec.audio_frame_samples(size)?;
            if codec.sample_rate == 0 {
                return None;
            }
            (samples as i64, codec.sample_rate as i64)
        }
        _ => return None,
    };
    (num != 0 && den != 0).then_some((num, den))
}

/// Frame duration in stream time base units
fn frame_duration(st: &Stream, hints: Option<&FrameHints>, size: usize) -> Option<i64> {
    let (num, den) = compute_frame_duration(st, hints, size)?;
    let tb = st.time_base();
    let duration = rescale_rnd(1, num * tb.den, den * tb.num, Rounding::Down);
    (duration != Timestamp::none().value).then_some(duration)
}

/// Anchor the stream's timestamp origin at the first known dts.
///
/// Packets of the stream already waiting in `pending` were stamped relative to
/// an unknown origin; they are shifted onto the real one. Also fills the
/// stream start time.
pub fn update_initial_timestamps(
    st: &mut Stream,
    dts: Timestamp,
    pts: Timestamp,
    pending: &mut PacketQueue,
) {
    if st.first_dts.is_valid() || dts.is_none() || st.cur_dts.is_none() {
        return;
    }

    let shift = dts.value - st.cur_dts.value;
    st.first_dts = Timestamp::new(shift);
    st.cur_dts = dts;

    for pkt in pending.iter_mut().filter(|p| p.stream_index == st.index) {
        if pkt.pts.is_valid() && pkt.pts == pkt.dts {
            pkt.pts = pkt.pts.offset(shift);
        }
        pkt.dts = pkt.dts.offset(shift);
        if st.info.start_time.is_none() && pkt.pts.is_valid() {
            st.info.start_time = pkt.pts;
        }
    }

    if st.info.start_time.is_none() {
        st.info.start_time = pts;
    }
}

/// Spread a newly learned frame duration over packets still waiting in
/// `pending` without any timing of their own.
pub fn update_initial_durations(st: &mut Stream, duration: i64, pending: &mut PacketQueue) {
    let index = st.index;
    let mut cur_dts = 0;

    if let Some(first_dts) = st.first_dts.get() {
        let untimed = pending
            .iter()
            .filter(|p| p.stream_index == index)
            .take_while(|p| p.pts == p.dts && p.dts.is_none() && p.duration == 0)
            .count() as i64;
        cur_dts = first_dts - untimed * duration;
    } else if st.cur_dts.value != 0 {
        return;
    }

    let fill_pts = st.codec().has_b_frames == 0;
    let audio = st.media_type() == MediaType::Audio;
    for pkt in pending.iter_mut().filter(|p| p.stream_index == index) {
        if !(pkt.pts == pkt.dts && pkt.dts.is_none() && pkt.duration == 0) {
            break;
        }
        pkt.dts = Timestamp::new(cur_dts);
        if fill_pts {
            pkt.pts = Timestamp::new(cur_dts);
        }
        cur_dts += duration;
        if !audio {
            pkt.duration = duration;
        }
    }

    if st.first_dts.is_none() {
        st.cur_dts = Timestamp::new(cur_dts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CodecId, CodecParameters};
    use crate::format::StreamInfo;
    use crate::util::{Buffer, Rational};

    fn video_stream(codec: CodecId, time_base: Rational, delay: u32) -> Stream {
        let mut params = CodecParameters::new(codec);
        params.has_b_frames = delay;
        Stream::new(0, StreamInfo::new(params).with_time_base(time_base), 2500)
    }

    fn packet(pts: Option<i64>, dts: Option<i64>) -> Packet {
        Packet::new(0, Buffer::from_vec(vec![0; 10])).with_timestamps(pts, dts)
    }

    #[test]
    fn test_fills_missing_dts_from_pts() {
        let reconciler = TimestampReconciler::default();
        let mut st = video_stream(CodecId::Mpeg4, Rational::new(1, 25), 0);
        let mut pending = PacketQueue::new();

        let mut pkt = packet(Some(5), None);
        reconciler.reconcile(&mut st, &mut pkt, None, &mut pending);
        assert_eq!(pkt.dts, Timestamp::new(5));
        assert_eq!(pkt.duration, 1);
        assert_eq!(st.cur_dts, Timestamp::new(6));
        assert_eq!(st.first_dts, Timestamp::new(5));
    }

    #[test]
    fn test_interpolates_untimed_packets() {
        let reconciler = TimestampReconciler::default();
        let mut st = video_stream(CodecId::Mpeg4, Rational::new(1, 25), 0);
        let mut pending = PacketQueue::new();

        let mut first = packet(Some(0), Some(0));
        reconciler.reconcile(&mut st, &mut first, None, &mut pending);
        for expected in 1..4 {
            let mut pkt = packet(None, None);
            reconciler.reconcile(&mut st, &mut pkt, None, &mut pending);
            assert_eq!(pkt.pts, Timestamp::new(expected));
            assert_eq!(pkt.dts, Timestamp::new(expected));
        }
    }

    #[test]
    fn test_wrap_correction() {
        let reconciler = TimestampReconciler::default();
        let mut st = video_stream(CodecId::Mpeg4, Rational::new(1, 90000), 0);
        let mut pending = PacketQueue::new();

        let wrap = 1i64 << 33;
        let mut pkt = packet(Some(100), Some(wrap - 3500));
        reconciler.reconcile(&mut st, &mut pkt, None, &mut pending);
        assert_eq!(pkt.dts, Timestamp::new(-3500));
        assert!(pkt.dts.value <= pkt.pts.value);
    }

    #[test]
    fn test_reorder_window_assigns_monotonic_dts() {
        let reconciler = TimestampReconciler {
            ign_dts: true,
            ..TimestampReconciler::default()
        };
        let mut st = video_stream(CodecId::Mpeg4, Rational::new(1, 25), 1);
        let mut pending = PacketQueue::new();

        let mut dts = Vec::new();
        for (pts, container_dts) in [(0, 0), (2, 1), (1, 3), (3, 2), (4, 4)] {
            let mut pkt = packet(Some(pts), Some(container_dts));
            reconciler.reconcile(&mut st, &mut pkt, None, &mut pending);
            assert_eq!(pkt.pts, Timestamp::new(pts));
            assert!(pkt.dts.value <= pkt.pts.value);
            dts.push(pkt.dts.value);
        }
        assert_eq!(dts, vec![0, 0, 1, 2, 3]);
        assert_eq!(st.cur_dts, Timestamp::new(3));
    }

    #[test]
    fn test_dts_ahead_of_pts_is_replaced() {
        let reconciler = TimestampReconciler::default();
        let mut st = video_stream(CodecId::Mpeg4, Rational::new(1, 25), 1);
        let mut pending = PacketQueue::new();

        let mut dts = Vec::new();
        for (pts, container_dts) in [(0, 0), (2, 1), (1, 3), (3, 2), (4, 4)] {
            let mut pkt = packet(Some(pts), Some(container_dts));
            reconciler.reconcile(&mut st, &mut pkt, None, &mut pending);
            assert_eq!(pkt.pts, Timestamp::new(pts));
            assert!(pkt.dts.value <= pkt.pts.value);
            dts.push(pkt.dts.value);
        }
        // the third packet is shown at 1, so it cannot be decoded later than 1
        assert_eq!(dts, vec![0, 1, 1, 2, 4]);
        assert!(dts.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(st.cur_dts, Timestamp::new(4));
    }

    #[test]
    fn test_small_dts_lead_is_not_a_wrap() {
        let reconciler = TimestampReconciler::default();
        let mut st = video_stream(CodecId::Mpeg4, Rational::new(1, 90000), 0);
        let mut pending = PacketQueue::new();

        let mut pkt = packet(Some(100), Some(3700));
        reconciler.reconcile(&mut st, &mut pkt, None, &mut pending);
        assert_eq!(pkt.dts, Timestamp::new(100));
        assert_eq!(pkt.pts, Timestamp::new(100));
    }

    #[test]
    fn test_delayed_presentation_uses_last_reference() {
        let reconciler = TimestampReconciler::default();
        let mut st = video_stream(CodecId::Mpeg2Video, Rational::new(1, 25), 1);
        let mut pending = PacketQueue::new();
        let i_frame = FrameHints {
            pict_type: PictureType::I,
            ..FrameHints::default()
        };
        let b_frame = FrameHints {
            pict_type: PictureType::B,
            ..FrameHints::default()
        };

        let mut i = packet(Some(1), Some(0));
        reconciler.reconcile(&mut st, &mut i, Some(&i_frame), &mut pending);
        assert_eq!(i.dts, Timestamp::new(0));
        assert_eq!(st.last_ip_pts, Timestamp::new(1));

        let mut p = packet(Some(3), None);
        reconciler.reconcile(&mut st, &mut p, Some(&i_frame), &mut pending);
        // dts of a reference frame is the pts of the previous one
        assert_eq!(p.dts, Timestamp::new(1));

        let mut b = packet(Some(2), None);
        reconciler.reconcile(&mut st, &mut b, Some(&b_frame), &mut pending);
        assert_eq!(b.dts, Timestamp::new(2));
        assert_eq!(b.pts, Timestamp::new(2));
    }

    #[test]
    fn test_no_fill_in_passes_through() {
        let reconciler = TimestampReconciler {
            no_fill_in: true,
            ..TimestampReconciler::default()
        };
        let mut st = video_stream(CodecId::Mpeg4, Rational::new(1, 25), 0);
        let mut pending = PacketQueue::new();
        let mut pkt = packet(None, None);
        reconciler.reconcile(&mut st, &mut pkt, None, &mut pending);
        assert!(pkt.pts.is_none());
        assert_eq!(pkt.duration, 0);
    }

    #[test]
    fn test_intra_only_gets_keyframe() {
        let reconciler = TimestampReconciler::default();
        let mut params = CodecParameters::new(CodecId::PcmS16Le);
        params.sample_rate = 8000;
        params.channels = 1;
        let mut st = Stream::new(
            0,
            StreamInfo::new(params).with_time_base(Rational::new(1, 8000)),
            2500,
        );
        let mut pending = PacketQueue::new();
        let mut pkt = Packet::new(0, Buffer::from_vec(vec![0; 160])).with_timestamps(0i64, 0i64);
        reconciler.reconcile(&mut st, &mut pkt, None, &mut pending);
        assert!(pkt.is_keyframe());
        // 80 samples of 16-bit mono audio
        assert_eq!(st.cur_dts, Timestamp::new(80));
    }

    #[test]
    fn test_initial_timestamps_shift_pending() {
        let mut st = video_stream(CodecId::Mpeg4, Rational::new(1, 25), 0);
        let mut pending = PacketQueue::new();
        pending.push(packet(Some(0), Some(0))).unwrap();
        pending.push(packet(Some(1), Some(1))).unwrap();
        st.cur_dts = Timestamp::new(2);

        update_initial_timestamps(&mut st, Timestamp::new(102), Timestamp::new(102), &mut pending);
        assert_eq!(st.first_dts, Timestamp::new(100));
        assert_eq!(st.cur_dts, Timestamp::new(102));
        let shifted: Vec<i64> = pending.iter().map(|p| p.dts.value).collect();
        assert_eq!(shifted, vec![100, 101]);
        assert_eq!(st.info.start_time, Timestamp::new(100));

        // the origin is fixed once known
        update_initial_timestamps(&mut st, Timestamp::new(500), Timestamp::new(500), &mut pending);
        assert_eq!(st.first_dts, Timestamp::new(100));
    }

    #[test]
    fn test_initial_durations_fill_untimed() {
        let mut st = video_stream(CodecId::Mpeg4, Rational::new(1, 25), 0);
        let mut pending = PacketQueue::new();
        pending.push(packet(None, None)).unwrap();
        pending.push(packet(None, None)).unwrap();

        update_initial_durations(&mut st, 1, &mut pending);
        let filled: Vec<(i64, i64, i64)> = pending
            .iter()
            .map(|p| (p.pts.value, p.dts.value, p.duration))
            .collect();
        assert_eq!(filled, vec![(0, 0, 1), (1, 1, 1)]);
        assert_eq!(st.cur_dts, Timestamp::new(2));
    }

    #[test]
    fn test_dts_sync_reference() {
        let reconciler = TimestampReconciler::default();
        let mut st = video_stream(CodecId::H264, Rational::new(1, 90000), 2);
        st.codec_mut().time_base = Rational::new(1, 50);
        let mut pending = PacketQueue::new();

        let sync = |sync_point, dts_ref_dts_delta, pts_dts_delta| FrameHints {
            dts_sync: Some(DtsSync {
                sync_point,
                dts_ref_dts_delta,
                pts_dts_delta,
            }),
            ..FrameHints::default()
        };

        let mut first = packet(None, Some(9000));
        reconciler.reconcile(&mut st, &mut first, Some(&sync(1, 0, 2)), &mut pending);
        assert_eq!(first.pts, Timestamp::new(9000 + 3600));
        assert_eq!(st.reference_dts, Timestamp::new(9000));

        let mut next = packet(None, None);
        reconciler.reconcile(&mut st, &mut next, Some(&sync(0, 2, 4)), &mut pending);
        assert_eq!(next.dts, Timestamp::new(9000 + 3600));
        assert_eq!(next.pts, Timestamp::new(9000 + 3600 + 7200));
    }

    #[test]
    fn test_frame_duration_sources() {
        let st = video_stream(CodecId::Mpeg4, Rational::new(1, 90000), 0);
        assert_eq!(compute_frame_duration(&st, None, 10), None);

        let mut st = video_stream(CodecId::Mpeg4, Rational::new(1, 90000), 0);
        st.info.avg_frame_rate = Rational::new(30000, 1001);
        assert_eq!(compute_frame_duration(&st, None, 10), Some((1001, 30000)));

        let mut st = video_stream(CodecId::Mpeg2Video, Rational::new(1, 90000), 0);
        st.codec_mut().time_base = Rational::new(1, 50);
        st.codec_mut().ticks_per_frame = 2;
        assert_eq!(compute_frame_duration(&st, None, 10), None);
        let hints = FrameHints {
            repeat_pict: 1,
            ..FrameHints::default()
        };
        assert_eq!(compute_frame_duration(&st, Some(&hints), 10), Some((2, 50)));
    }
}
