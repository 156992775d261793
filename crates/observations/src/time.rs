//! Canonical timestamp keys and processing dates.
//!
//! A [`TimestampKey`] is the 12-digit `YYYYMMDDHHMM` string used both as the
//! bucket key and as the stem of rendered artifact names. Fixed width means
//! lexicographic order is chronological order.

use std::fmt;

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ObservationError, Result};

/// `YYYYMMDDHHMM` key identifying one map time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimestampKey(String);

impl TimestampKey {
    /// Build a key from already validated date-time parts.
    pub fn from_parts(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Self {
        Self(format!(
            "{:04}{:02}{:02}{:02}{:02}",
            year, month, day, hour, minute
        ))
    }

    /// Parse and validate a 12-digit key.
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != 12 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ObservationError::InvalidTimestamp(s.to_string()));
        }
        ProcessingDate::parse(&s[..8])
            .map_err(|_| ObservationError::InvalidTimestamp(s.to_string()))?;
        TimeOfDay::parse(&s[8..])
            .map_err(|_| ObservationError::InvalidTimestamp(s.to_string()))?;
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `YYYYMMDD` part.
    pub fn date_prefix(&self) -> &str {
        &self.0[..8]
    }

    /// The `HHMM` part.
    pub fn time_of_day(&self) -> TimeOfDay {
        let hour = self.0[8..10].parse().unwrap_or(0);
        let minute = self.0[10..12].parse().unwrap_or(0);
        TimeOfDay { hour, minute }
    }

    pub fn is_on(&self, date: &ProcessingDate) -> bool {
        self.date_prefix() == date.prefix()
    }
}

impl fmt::Display for TimestampKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TimestampKey {
    type Error = ObservationError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<TimestampKey> for String {
    fn from(key: TimestampKey) -> Self {
        key.0
    }
}

/// Hour and minute within a day, displayed as `HHMM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay { hour: 0, minute: 0 };

    /// Last hour that can start a map on a given day.
    pub const LAST_HOUR: u8 = 23;

    /// Time of the last map of a day.
    pub const LAST_MAP: TimeOfDay = TimeOfDay {
        hour: Self::LAST_HOUR,
        minute: 0,
    };

    pub fn new(hour: u8, minute: u8) -> Result<Self> {
        if hour > Self::LAST_HOUR || minute > 59 {
            return Err(ObservationError::InvalidTimeOfDay(format!(
                "{:02}{:02}",
                hour, minute
            )));
        }
        Ok(Self { hour, minute })
    }

    /// Parse `HHMM`.
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ObservationError::InvalidTimeOfDay(s.to_string()));
        }
        let hour = s[..2]
            .parse()
            .map_err(|_| ObservationError::InvalidTimeOfDay(s.to_string()))?;
        let minute = s[2..]
            .parse()
            .map_err(|_| ObservationError::InvalidTimeOfDay(s.to_string()))?;
        Self::new(hour, minute)
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// One hour later, or `None` when that would leave the day.
    pub fn plus_one_hour(&self) -> Option<TimeOfDay> {
        (self.hour < Self::LAST_HOUR).then(|| TimeOfDay {
            hour: self.hour + 1,
            minute: self.minute,
        })
    }

    /// Start of the hour `now` falls in.
    pub fn current_hour(now: DateTime<Utc>) -> TimeOfDay {
        TimeOfDay {
            hour: now.hour() as u8,
            minute: 0,
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}{:02}", self.hour, self.minute)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = ObservationError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<TimeOfDay> for String {
    fn from(time: TimeOfDay) -> Self {
        time.to_string()
    }
}

/// A calendar date being processed, written `YYYYMMDD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessingDate(NaiveDate);

impl ProcessingDate {
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ObservationError::InvalidDate(s.to_string()));
        }
        NaiveDate::parse_from_str(s, "%Y%m%d")
            .map(Self)
            .map_err(|_| ObservationError::InvalidDate(s.to_string()))
    }

    pub fn from_naive(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn naive(&self) -> NaiveDate {
        self.0
    }

    /// The `YYYYMMDD` prefix shared by every key of this date.
    pub fn prefix(&self) -> String {
        self.0.format("%Y%m%d").to_string()
    }

    pub fn key_at(&self, time: TimeOfDay) -> TimestampKey {
        TimestampKey(format!("{}{}", self.prefix(), time))
    }

    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.0 == now.date_naive()
    }
}

impl fmt::Display for ProcessingDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y%m%d"))
    }
}
