//! Timestamp handling for media streams

use super::rational::{rescale_q, Rational};
use std::fmt;

/// Time base for timestamps (1/time_base seconds per tick)
pub type TimeBase = Rational;

/// Raw sentinel value used for an unknown timestamp
pub const NOPTS_VALUE: i64 = i64::MIN;

/// A possibly-unknown timestamp in a media stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timestamp {
    /// Timestamp value in time_base units
    pub value: i64,
}

impl Timestamp {
    /// Create a new timestamp
    pub const fn new(value: i64) -> Self {
        Timestamp { value }
    }

    /// No timestamp / unknown timestamp
    pub const fn none() -> Self {
        Timestamp { value: NOPTS_VALUE }
    }

    /// Check if timestamp is valid
    pub fn is_valid(&self) -> bool {
        self.value != NOPTS_VALUE
    }

    /// Check if timestamp is unknown
    pub fn is_none(&self) -> bool {
        self.value == NOPTS_VALUE
    }

    /// The value, if known
    pub fn get(&self) -> Option<i64> {
        self.is_valid().then_some(self.value)
    }

    /// Convert timestamp to seconds
    pub fn to_seconds(&self, time_base: TimeBase) -> f64 {
        if !self.is_valid() {
            return 0.0;
        }
        self.value as f64 * time_base.to_f64()
    }

    /// Rescale timestamp from one time base to another
    pub fn rescale(&self, from: TimeBase, to: TimeBase) -> Self {
        if !self.is_valid() {
            return *self;
        }
        Timestamp::new(rescale_q(self.value, from, to))
    }

    /// Add a tick offset, keeping unknown timestamps unknown
    pub fn offset(&self, delta: i64) -> Self {
        match self.get() {
            Some(v) => Timestamp::new(v.saturating_add(delta)),
            None => *self,
        }
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::none()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.value)
        } else {
            write!(f, "NOPTS")
        }
    }
}

impl From<i64> for Timestamp {
    fn from(value: i64) -> Self {
        Timestamp::new(value)
    }
}

impl From<Option<i64>> for Timestamp {
    fn from(value: Option<i64>) -> Self {
        value.map_or(Timestamp::none(), Timestamp::new)
    }
}
