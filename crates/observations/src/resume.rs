//! Resume point computation from already produced maps.
//!
//! Existing artifacts are named by their [`TimestampKey`]. The next map to
//! produce for a date is one hour after the latest one present.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::time::{ProcessingDate, TimeOfDay, TimestampKey};

/// Where processing of a date should start.
///
/// Variants are ordered so that the minimum of several boundaries is the
/// earliest start, with `AlreadyComplete` only winning when nothing else is
/// left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StartBoundary {
    /// Produce maps from this time of day onwards.
    From(TimeOfDay),
    /// No work remains for the date.
    AlreadyComplete,
}

impl StartBoundary {
    pub fn start(&self) -> Option<TimeOfDay> {
        match self {
            StartBoundary::From(time) => Some(*time),
            StartBoundary::AlreadyComplete => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, StartBoundary::AlreadyComplete)
    }
}

/// Computes start boundaries from already produced timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeTracker {
    default_start: TimeOfDay,
}

impl Default for ResumeTracker {
    fn default() -> Self {
        Self::new(TimeOfDay::MIDNIGHT)
    }
}

impl ResumeTracker {
    pub fn new(default_start: TimeOfDay) -> Self {
        Self { default_start }
    }

    pub fn default_start(&self) -> TimeOfDay {
        self.default_start
    }

    /// Start time for `date_prefix` given the keys already produced.
    ///
    /// One hour after the latest existing time of day on that date, but never
    /// past [`TimeOfDay::LAST_MAP`]; the default start when there is none;
    /// `AlreadyComplete` when the latest is in the last hour of the day.
    pub fn compute_start_time(
        &self,
        existing: &BTreeSet<TimestampKey>,
        date_prefix: &str,
    ) -> StartBoundary {
        let latest = existing
            .iter()
            .filter(|key| key.date_prefix() == date_prefix)
            .map(TimestampKey::time_of_day)
            .max();

        match latest {
            None => StartBoundary::From(self.default_start),
            Some(latest) => match latest.plus_one_hour() {
                Some(next) => StartBoundary::From(next.min(TimeOfDay::LAST_MAP)),
                None => StartBoundary::AlreadyComplete,
            },
        }
    }

    /// Like [`ResumeTracker::compute_start_time`], but a start that has not
    /// been reached yet on the current UTC date also counts as complete.
    pub fn compute_start_for_date(
        &self,
        existing: &BTreeSet<TimestampKey>,
        date: &ProcessingDate,
        now: DateTime<Utc>,
    ) -> StartBoundary {
        let boundary = self.compute_start_time(existing, &date.prefix());
        match boundary {
            StartBoundary::From(start)
                if date.is_current(now) && start >= TimeOfDay::current_hour(now) =>
            {
                debug!(date = %date, start = %start, "Maps already up to date for today");
                StartBoundary::AlreadyComplete
            }
            other => other,
        }
    }

    /// Earliest start over the variables sharing one fetch.
    ///
    /// Complete variables are ignored; the result is `AlreadyComplete` only
    /// when every variable is complete, or when there are none.
    pub fn earliest_across_variables<K>(starts: &BTreeMap<K, StartBoundary>) -> StartBoundary {
        starts
            .values()
            .min()
            .copied()
            .unwrap_or(StartBoundary::AlreadyComplete)
    }
}
