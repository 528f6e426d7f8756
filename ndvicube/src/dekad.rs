//! Dekadal date arithmetic.
//!
//! A dekad is a ~10 day period anchored on the 1st, 11th and 21st of each
//! month. Every composite in the cube is stamped on one of these anchors at
//! 00:00:00 UTC.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};

/// Days of the month that anchor a dekad.
pub const DEKAD_DAYS: [u32; 3] = [1, 11, 21];

/// Errors produced while parsing dates or intervals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateError {
    /// The string is neither `YYYY-MM-DD` nor RFC 3339.
    InvalidDate(String),
    /// The interval end lies before its start.
    Reversed { start: String, end: String },
}

impl fmt::Display for DateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateError::InvalidDate(s) => {
                write!(f, "invalid date '{}': expected YYYY-MM-DD or RFC 3339", s)
            }
            DateError::Reversed { start, end } => {
                write!(f, "interval end {} is before start {}", end, start)
            }
        }
    }
}

impl std::error::Error for DateError {}

/// Parses `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 timestamp.
pub fn parse_instant(s: &str) -> Result<DateTime<Utc>, DateError> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(midnight(date));
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DateError::InvalidDate(s.to_string()))
}

/// Midnight UTC of the given calendar date.
pub fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

/// A closed time interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeInterval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeInterval {
    /// Creates an interval, rejecting `end < start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, DateError> {
        if end < start {
            return Err(DateError::Reversed {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    /// The degenerate interval `[t, t]`.
    pub fn instant(t: DateTime<Utc>) -> Self {
        Self { start: t, end: t }
    }

    /// The calendar day containing `t`, from 00:00:00 to 23:59:59.
    pub fn day_of(t: DateTime<Utc>) -> Self {
        let start = midnight(t.date_naive());
        Self {
            start,
            end: start + Duration::days(1) - Duration::seconds(1),
        }
    }

    /// Parses both bounds with [`parse_instant`].
    pub fn parse(start: &str, end: &str) -> Result<Self, DateError> {
        Self::new(parse_instant(start)?, parse_instant(end)?)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Returns true if `t` lies inside the closed interval.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }

    /// Moves the start back and/or the end forward by one `step`.
    pub fn widen(&self, widen_start: bool, widen_end: bool, step: Duration) -> Self {
        Self {
            start: if widen_start {
                self.start - step
            } else {
                self.start
            },
            end: if widen_end { self.end + step } else { self.end },
        }
    }

    /// The dekadal targets inside this interval.
    pub fn targets(&self) -> DekadalTargets {
        dekadal_targets(self.start, self.end)
    }

    /// `start/end` in the form catalog APIs expect.
    pub fn to_iso_range(&self) -> String {
        format!("{}/{}", format_instant(self.start), format_instant(self.end))
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {})",
            format_instant(self.start),
            format_instant(self.end)
        )
    }
}

impl FromStr for TimeInterval {
    type Err = DateError;

    /// Parses `start/end`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('/')
            .ok_or_else(|| DateError::InvalidDate(s.to_string()))?;
        Self::parse(start, end)
    }
}

/// Formats an instant as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn format_instant(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Lazy iterator over the dekadal targets of an interval.
///
/// The iterator is `Clone`, so a sequence can be restarted by cloning it
/// before consumption.
#[derive(Debug, Clone)]
pub struct DekadalTargets {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    year: i32,
    month: u32,
    slot: usize,
}

impl Iterator for DekadalTargets {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        while (self.year, self.month) <= (self.end.year(), self.end.month()) {
            if self.slot == DEKAD_DAYS.len() {
                self.slot = 0;
                if self.month == 12 {
                    self.month = 1;
                    self.year += 1;
                } else {
                    self.month += 1;
                }
                continue;
            }

            let day = DEKAD_DAYS[self.slot];
            self.slot += 1;

            let Some(date) = NaiveDate::from_ymd_opt(self.year, self.month, day) else {
                continue;
            };
            let candidate = midnight(date);
            if candidate >= self.start && candidate <= self.end {
                return Some(candidate);
            }
        }
        None
    }
}

/// Dekadal targets (day 1, 11, 21 at 00:00 UTC) within `[start, end]`.
///
/// Iterates month by month from `start`'s month through `end`'s month.
/// Yields nothing when `start > end`.
pub fn dekadal_targets(start: DateTime<Utc>, end: DateTime<Utc>) -> DekadalTargets {
    DekadalTargets {
        start,
        end,
        year: start.year(),
        month: start.month(),
        slot: 0,
    }
}

/// True iff at least one time is strictly before `target` and at least one
/// strictly after. Times equal to `target` count for neither side.
pub fn has_observations_around<'a, I>(times: I, target: DateTime<Utc>) -> bool
where
    I: IntoIterator<Item = &'a DateTime<Utc>>,
{
    let mut before = false;
    let mut after = false;
    for t in times {
        before |= *t < target;
        after |= *t > target;
        if before && after {
            return true;
        }
    }
    false
}
