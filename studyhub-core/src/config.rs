//! Tunables shared by the engines. The binary builds these from its CLI/env
//! configuration; tests use the defaults.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use std::time::Duration;

/// Fixes which calendar day an instant belongs to. Review dates and due
/// checks always go through this, never through the machine's local zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DayBoundary {
    offset: FixedOffset,
}

impl DayBoundary {
    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    /// `None` when the offset is outside +/- 24h.
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes.checked_mul(60)?).map(|offset| Self { offset })
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }
}

impl Default for DayBoundary {
    fn default() -> Self {
        Self::utc()
    }
}

#[derive(Clone, Debug)]
pub struct ExamPolicy {
    pub max_questions: usize,
    pub max_time_limit_minutes: u32,
    /// Serve a shorter exam instead of failing when the filtered pool is
    /// smaller than the requested count.
    pub allow_truncation: bool,
}

impl Default for ExamPolicy {
    fn default() -> Self {
        Self {
            max_questions: 120,
            max_time_limit_minutes: 360,
            allow_truncation: false,
        }
    }
}

/// Timeouts and retry limits for store calls.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub read_attempts: u32,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub backoff: Duration,
    /// Compare-and-swap attempts before a mutation gives up with `Conflict`.
    pub cas_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            read_attempts: 3,
            read_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(5),
            backoff: Duration::from_millis(50),
            cas_attempts: 5,
        }
    }
}
