//! Timestamp values.
//!
//! Timestamps travel as a FILETIME: a count of 100-nanosecond ticks since
//! 1601-01-01 00:00:00 UTC, split into two 32-bit halves. [`FileTime`] keeps
//! the halves as they appear on the wire and converts to and from
//! [`chrono::DateTime`] for anything human-facing.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PropertyError, PropertyResult};

/// Ticks per second (100ns resolution).
pub const TICKS_PER_SECOND: u64 = 10_000_000;

/// Seconds between 1601-01-01 and 1970-01-01.
pub const EPOCH_DIFFERENCE_SECS: i64 = 11_644_473_600;

/// Format used when rendering timestamps for callers.
pub const DATE_FORMAT: &str = "%a %b %e %H:%M:%S %Y UTC";

/// A FILETIME value: 100ns ticks since 1601-01-01 UTC as two 32-bit halves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileTime {
    /// Low 32 bits of the tick count.
    pub low: u32,
    /// High 32 bits of the tick count.
    pub high: u32,
}

impl FileTime {
    /// Creates a FILETIME from its two halves.
    pub fn new(low: u32, high: u32) -> Self {
        Self { low, high }
    }

    /// Splits a 64-bit tick count into halves.
    pub fn from_ticks(ticks: u64) -> Self {
        Self {
            low: (ticks & 0xFFFF_FFFF) as u32,
            high: (ticks >> 32) as u32,
        }
    }

    /// Reassembles the 64-bit tick count.
    pub fn ticks(&self) -> u64 {
        ((self.high as u64) << 32) | self.low as u64
    }

    /// Converts a UTC datetime. Instants before 1601 are rejected.
    pub fn from_datetime(dt: DateTime<Utc>) -> PropertyResult<Self> {
        let secs = dt.timestamp() + EPOCH_DIFFERENCE_SECS;
        if secs < 0 {
            return Err(PropertyError::InvalidTimestamp(dt.to_rfc3339()));
        }
        let ticks = (secs as u64)
            .checked_mul(TICKS_PER_SECOND)
            .and_then(|t| t.checked_add(dt.timestamp_subsec_nanos() as u64 / 100))
            .ok_or_else(|| PropertyError::InvalidTimestamp(dt.to_rfc3339()))?;
        Ok(Self::from_ticks(ticks))
    }

    /// Converts to a UTC datetime.
    ///
    /// Returns `None` only if the tick count is beyond chrono's range.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let ticks = self.ticks();
        let secs = (ticks / TICKS_PER_SECOND) as i64 - EPOCH_DIFFERENCE_SECS;
        let nanos = ((ticks % TICKS_PER_SECOND) * 100) as u32;
        DateTime::from_timestamp(secs, nanos)
    }

    /// Renders the timestamp as a human-readable date string.
    pub fn to_date_string(&self) -> Option<String> {
        self.to_datetime()
            .map(|dt| dt.format(DATE_FORMAT).to_string())
    }

    /// Parses ISO-like text supplied by a caller.
    ///
    /// Accepts RFC 3339 (`2009-06-01T12:00:00Z`) as well as
    /// `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DDTHH:MM:SS`, the latter two read
    /// as UTC.
    pub fn parse(text: &str) -> PropertyResult<Self> {
        let text = text.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Self::from_datetime(dt.with_timezone(&Utc));
        }
        for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
                return Self::from_datetime(naive.and_utc());
            }
        }
        Err(PropertyError::InvalidTimestamp(text.to_string()))
    }
}

impl From<DateTime<Utc>> for FileTime {
    /// Saturates to zero for instants before 1601.
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_datetime(dt).unwrap_or_default()
    }
}
