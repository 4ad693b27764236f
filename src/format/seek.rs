//! Seek primitives: index lookup and timestamp-driven byte search

use super::index::{IndexEntries, IndexEntry};
use crate::error::{Error, Result};
use crate::util::Timestamp;
use tracing::{error, trace};

/// Seek request flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeekFlags {
    /// Land at or before the target instead of at or after it
    pub backward: bool,
    /// The target is a byte position
    pub byte: bool,
    /// Accept non-keyframe landing points
    pub any: bool,
}

impl SeekFlags {
    pub fn backward() -> Self {
        SeekFlags {
            backward: true,
            ..Self::default()
        }
    }

    pub fn byte() -> Self {
        SeekFlags {
            byte: true,
            ..Self::default()
        }
    }

    pub fn any(mut self) -> Self {
        self.any = true;
        self
    }

    /// Same flags with the direction replaced
    pub fn with_backward(mut self, backward: bool) -> Self {
        self.backward = backward;
        self
    }
}

/// Nearest usable index entry for `target`
pub fn seek_by_index(entries: &IndexEntries, target: i64, flags: SeekFlags) -> Result<IndexEntry> {
    entries
        .search(target, flags)
        .and_then(|i| entries.get(i))
        .copied()
        .ok_or_else(|| Error::not_found(format!("no index entry for timestamp {}", target)))
}

/// Clamp a byte seek target into the readable part of the input
pub fn byte_seek_target(pos: i64, data_offset: i64, file_size: Option<u64>) -> i64 {
    let mut pos = pos.max(data_offset);
    if let Some(size) = file_size {
        let last = (size as i64 - 1).max(data_offset);
        pos = pos.min(last);
    }
    pos
}

/// What is known about the byte and timestamp range bracketing a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchBounds {
    pub pos_min: i64,
    pub ts_min: Timestamp,
    pub pos_max: i64,
    pub ts_max: Timestamp,
    /// Highest position worth reading from; below `pos_max` by the keyframe distance
    pub pos_limit: i64,
}

impl Default for SearchBounds {
    fn default() -> Self {
        SearchBounds {
            pos_min: 0,
            ts_min: Timestamp::none(),
            pos_max: 0,
            ts_max: Timestamp::none(),
            pos_limit: -1,
        }
    }
}

impl SearchBounds {
    /// Bounds taken from the closest index entries around `target`
    pub fn from_index(entries: &IndexEntries, target: i64, flags: SeekFlags) -> Self {
        let mut bounds = SearchBounds::default();
        if entries.is_empty() {
            return bounds;
        }

        let below = entries.search(target, flags.with_backward(true)).unwrap_or(0);
        if let Some(e) = entries.get(below) {
            if e.timestamp <= target || e.pos == e.min_distance {
                bounds.pos_min = e.pos;
                bounds.ts_min = Timestamp::new(e.timestamp);
            }
        }

        if let Some(e) = entries
            .search(target, flags.with_backward(false))
            .and_then(|i| entries.get(i))
        {
            bounds.pos_max = e.pos;
            bounds.ts_max = Timestamp::new(e.timestamp);
            bounds.pos_limit = e.pos - e.min_distance;
        }
        bounds
    }
}

/// Locate `target` by reading timestamps at chosen byte positions.
///
/// `read_timestamp(pos, pos_limit)` returns the timestamp and position of the
/// first packet starting at or after `pos` (and not after `pos_limit`), or
/// `None` when there is none. Unknown bounds are discovered first: the lower
/// one at `data_offset`, the upper one by probing back from the end of the
/// input in doubling steps. Candidates come from linear interpolation, then
/// bisection, then a linear scan once the previous strategy stopped moving.
///
/// Returns `(pos, ts)` of the landing packet.
pub fn generic_seek<F>(
    target: i64,
    bounds: SearchBounds,
    data_offset: i64,
    file_size: Option<u64>,
    flags: SeekFlags,
    mut read_timestamp: F,
) -> Result<(i64, i64)>
where
    F: FnMut(i64, i64) -> Result<Option<(i64, i64)>>,
{
    let SearchBounds {
        mut pos_min,
        ts_min,
        mut pos_max,
        ts_max,
        mut pos_limit,
    } = bounds;

    let mut ts_min = match ts_min.get() {
        Some(ts) => ts,
        None => {
            let (ts, pos) = read_timestamp(data_offset, i64::MAX)?
                .ok_or_else(|| Error::not_found("no timestamp at start of data"))?;
            pos_min = pos;
            ts
        }
    };

    let mut ts_max = match ts_max.get() {
        Some(ts) => ts,
        None => {
            let size = file_size
                .ok_or_else(|| Error::unsupported("timestamp search needs the input size"))?
                as i64;
            let mut step = 1024i64;
            let mut probe = size - 1;
            let found = loop {
                probe = (probe - step).max(data_offset);
                if let Some(hit) = read_timestamp(probe, probe + step)? {
                    break hit;
                }
                if probe <= data_offset {
                    return Err(Error::not_found("no timestamp near end of data"));
                }
                step += step;
            };
            let (mut ts, mut pos) = found;

            while let Some((next_ts, next_pos)) = read_timestamp(pos + 1, i64::MAX)? {
                ts = next_ts;
                pos = next_pos;
                if next_pos >= size {
                    break;
                }
            }
            pos_max = pos;
            pos_limit = pos;
            ts
        }
    };

    if ts_min > ts_max {
        return Err(Error::not_found("timestamps decrease across the input"));
    } else if ts_min == ts_max {
        pos_limit = pos_min;
    }

    let mut no_change = 0;
    while pos_min < pos_limit {
        let mut pos = match no_change {
            0 => {
                let keyframe_distance = pos_max - pos_limit;
                interpolate_pos(target, (ts_min, pos_min), (ts_max, pos_max))
                    .saturating_sub(keyframe_distance)
            }
            1 => (pos_min + pos_limit) >> 1,
            _ => pos_min,
        };
        if pos <= pos_min {
            pos = pos_min + 1;
        } else if pos > pos_limit {
            pos = pos_limit;
        }
        let start_pos = pos;

        let Some((ts, found_pos)) = read_timestamp(pos, i64::MAX)? else {
            error!("read_timestamp failed in the middle of the search at {}", start_pos);
            return Err(Error::not_found("timestamp search lost its footing"));
        };
        pos = found_pos;
        if pos == pos_max {
            no_change += 1;
        } else {
            no_change = 0;
        }
        trace!(
            pos_min,
            pos_max,
            pos,
            pos_limit,
            start_pos,
            no_change,
            ts,
            target,
            "timestamp search step"
        );

        if target <= ts {
            pos_limit = start_pos - 1;
            pos_max = pos;
            ts_max = ts;
        }
        if target >= ts {
            pos_min = pos;
            ts_min = ts;
        }
    }

    if flags.backward {
        Ok((pos_min, ts_min))
    } else if ts_max < target {
        Err(Error::not_found(format!("timestamp {} is past the end", target)))
    } else {
        Ok((pos_max, ts_max))
    }
}

/// Position of `target` on the line through two `(ts, pos)` points, rounded
/// to nearest and saturated to the `i64` range
fn interpolate_pos(
    target: i64,
    (ts_min, pos_min): (i64, i64),
    (ts_max, pos_max): (i64, i64),
) -> i64 {
    let span = ts_max as i128 - ts_min as i128;
    if span <= 0 {
        return pos_min;
    }
    let offset = (target as i128 - ts_min as i128).saturating_mul(pos_max as i128 - pos_min as i128);
    let half = span / 2;
    let scaled = if offset < 0 {
        -(offset.saturating_neg().saturating_add(half) / span)
    } else {
        offset.saturating_add(half) / span
    };
    (pos_min as i128)
        .saturating_add(scaled)
        .clamp(i64::MIN as i128, i64::MAX as i128) as i64
}
