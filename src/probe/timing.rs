//! Global and per-stream duration estimation

use crate::format::DemuxerContext;
use crate::util::{rescale, rescale_q, Rational, Timestamp, TIME_BASE_US};
use tracing::{debug, warn};

fn microseconds() -> Rational {
    Rational::new(1, TIME_BASE_US)
}

/// Derive start time, duration and bit rate for the input and its streams.
///
/// Known stream durations are preferred. Without any, every stream's
/// duration is guessed from the file size and the summed bit rates.
pub fn estimate_timings(ctx: &mut DemuxerContext) {
    let file_size = if ctx.format_info().flags.no_file {
        0
    } else {
        ctx.file_size().unwrap_or(0)
    };

    if has_duration(ctx) {
        fill_all_stream_timings(ctx, file_size);
    } else {
        warn!("Estimating duration from bitrate, this may be inaccurate");
        estimate_timings_from_bit_rate(ctx, file_size);
    }
    update_stream_timings(ctx, file_size);

    for st in ctx.streams() {
        debug!(
            "stream {}: start_time {} duration {}",
            st.index, st.info.start_time, st.info.duration
        );
    }
    debug!(
        "format: start_time {} duration {} bitrate {} kb/s",
        ctx.start_time(),
        ctx.duration(),
        ctx.bit_rate() / 1000
    );
}

fn has_duration(ctx: &DemuxerContext) -> bool {
    ctx.duration().is_valid() || ctx.streams().iter().any(|st| st.info.duration.is_valid())
}

/// Fill the global start and duration from the streams' values
fn update_stream_timings(ctx: &mut DemuxerContext, file_size: u64) {
    let mut start_time = i64::MAX;
    let mut end_time = i64::MIN;
    let mut duration = i64::MIN;

    for st in ctx.streams() {
        let tb = st.time_base();
        if tb.den == 0 {
            continue;
        }
        if let Some(start) = st.info.start_time.get() {
            let start = rescale_q(start, tb, microseconds());
            start_time = start_time.min(start);
            if let Some(dur) = st.info.duration.get() {
                end_time = end_time.max(start + rescale_q(dur, tb, microseconds()));
            }
        }
        if let Some(dur) = st.info.duration.get() {
            duration = duration.max(rescale_q(dur, tb, microseconds()));
        }
    }

    if start_time != i64::MAX {
        ctx.start_time = Timestamp::new(start_time);
        if end_time != i64::MIN {
            duration = duration.max(end_time - start_time);
        }
    }
    if duration != i64::MIN {
        ctx.duration = Timestamp::new(duration);
        if file_size > 0 && duration > 0 {
            ctx.bit_rate = (file_size as f64 * 8.0 * TIME_BASE_US as f64 / duration as f64) as i64;
        }
    }
}

/// Give streams lacking timing information the global values
fn fill_all_stream_timings(ctx: &mut DemuxerContext, file_size: u64) {
    update_stream_timings(ctx, file_size);
    let (start_time, duration) = (ctx.start_time, ctx.duration);
    for st in &mut ctx.streams {
        if st.info.start_time.is_valid() {
            continue;
        }
        let tb = st.time_base();
        if let Some(start) = start_time.get() {
            st.info.start_time = Timestamp::new(rescale_q(start, microseconds(), tb));
        }
        if let Some(dur) = duration.get() {
            st.info.duration = Timestamp::new(rescale_q(dur, microseconds(), tb));
        }
    }
}

/// Guess stream durations from the file size and bit rate
fn estimate_timings_from_bit_rate(ctx: &mut DemuxerContext, file_size: u64) {
    if ctx.bit_rate <= 0 {
        ctx.bit_rate = ctx
            .streams
            .iter()
            .map(|st| st.info.codec.bit_rate)
            .filter(|&rate| rate > 0)
            .sum();
    }

    let bit_rate = ctx.bit_rate;
    if ctx.duration.is_valid() || bit_rate == 0 || file_size == 0 {
        return;
    }
    for st in &mut ctx.streams {
        if st.info.duration.is_valid() {
            continue;
        }
        let tb = st.time_base();
        if tb.num == 0 {
            continue;
        }
        st.info.duration = Timestamp::new(rescale(8 * file_size as i64, tb.den, bit_rate * tb.num));
    }
}
