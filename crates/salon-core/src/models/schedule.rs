//! Time ranges and stylist working schedules

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Half-open time interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Range starting at `start` lasting `minutes`
    pub fn with_minutes(start: DateTime<Utc>, minutes: i64) -> Self {
        Self {
            start,
            end: start + Duration::minutes(minutes),
        }
    }

    /// A range is valid only when it ends after it starts
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.end > self.start
    }

    /// Half-open intersection test: touching ranges do not overlap
    #[inline]
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && self.end > other.start
    }

    /// Check if `other` lies entirely inside this range
    #[inline]
    pub fn contains(&self, other: &TimeRange) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    /// Pad the range by `minutes` on both sides
    pub fn expand(&self, minutes: i64) -> TimeRange {
        let pad = Duration::minutes(minutes.max(0));
        TimeRange {
            start: self.start - pad,
            end: self.end + pad,
        }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// A stylist's working windows and breaks for one day
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StylistSchedule {
    #[serde(default)]
    pub working_hours: Vec<TimeRange>,

    #[serde(default)]
    pub breaks: Vec<TimeRange>,
}

impl StylistSchedule {
    /// No working windows means the stylist is off that day
    pub fn is_day_off(&self) -> bool {
        self.working_hours.is_empty()
    }
}
