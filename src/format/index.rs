//! Per-stream timestamp to byte-position index

use super::seek::SeekFlags;
use crate::error::{Error, Result};
use crate::util::NOPTS_VALUE;

/// One seek point of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Byte position reading should restart from
    pub pos: i64,
    /// Timestamp in stream time base units
    pub timestamp: i64,
    /// Packet size in bytes, 0 if unknown
    pub size: u32,
    /// Minimum byte distance from this entry to the previous keyframe
    pub min_distance: i64,
    pub keyframe: bool,
}

impl IndexEntry {
    /// A keyframe entry with no size or distance information
    pub fn keyframe(pos: i64, timestamp: i64) -> Self {
        IndexEntry {
            pos,
            timestamp,
            size: 0,
            min_distance: 0,
            keyframe: true,
        }
    }
}

/// Entries kept sorted by strictly increasing timestamp
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexEntries {
    entries: Vec<IndexEntry>,
}

impl IndexEntries {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, keeping timestamp order.
    ///
    /// An entry whose timestamp is already present replaces it, except that
    /// `min_distance` only ever shrinks. Returns the entry's position.
    pub fn add(&mut self, entry: IndexEntry) -> Result<usize> {
        if entry.timestamp == NOPTS_VALUE {
            return Err(Error::invalid_input("index entry without timestamp"));
        }
        self.entries
            .try_reserve(1)
            .map_err(|e| Error::out_of_memory(format!("index: {}", e)))?;

        let any_forward = SeekFlags {
            any: true,
            ..SeekFlags::default()
        };
        match self.search(entry.timestamp, any_forward) {
            None => {
                self.entries.push(entry);
                Ok(self.entries.len() - 1)
            }
            Some(i) if self.entries[i].timestamp != entry.timestamp => {
                self.entries.insert(i, entry);
                Ok(i)
            }
            Some(i) => {
                let existing = &mut self.entries[i];
                let min_distance = existing.min_distance.min(entry.min_distance);
                *existing = IndexEntry {
                    min_distance,
                    ..entry
                };
                Ok(i)
            }
        }
    }

    /// Binary search for `wanted`.
    ///
    /// Backward picks the last entry with `timestamp <= wanted`, forward the
    /// first with `timestamp >= wanted`. Unless `flags.any` is set the result
    /// is walked outward to the nearest keyframe.
    pub fn search(&self, wanted: i64, flags: SeekFlags) -> Option<usize> {
        let n = self.entries.len() as isize;
        let mut a: isize = -1;
        let mut b: isize = n;

        // appending at the end is the common case
        if n > 0 && self.entries[(n - 1) as usize].timestamp < wanted {
            a = n - 1;
        }

        while b - a > 1 {
            let m = (a + b) >> 1;
            let timestamp = self.entries[m as usize].timestamp;
            if timestamp >= wanted {
                b = m;
            }
            if timestamp <= wanted {
                a = m;
            }
        }

        let step = if flags.backward { -1 } else { 1 };
        let mut m = if flags.backward { a } else { b };
        if !flags.any {
            while m >= 0 && m < n && !self.entries[m as usize].keyframe {
                m += step;
            }
        }

        (m >= 0 && m < n).then_some(m as usize)
    }

    /// Keep every other entry once the index holds `max_entries` or more
    pub fn reduce(&mut self, max_entries: usize) {
        if self.entries.len() < max_entries {
            return;
        }
        let kept: Vec<IndexEntry> = self.entries.iter().step_by(2).copied().collect();
        self.entries = kept;
    }

    /// Entry count that fits into `bytes` of index memory
    pub fn max_entries_for(bytes: usize) -> usize {
        bytes / std::mem::size_of::<IndexEntry>()
    }

    pub fn get(&self, i: usize) -> Option<&IndexEntry> {
        self.entries.get(i)
    }

    pub fn first(&self) -> Option<&IndexEntry> {
        self.entries.first()
    }

    pub fn last(&self) -> Option<&IndexEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_slice(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
