//! Signed durations made of days plus a sub-day remainder.

use std::cmp::Ordering;
use std::fmt;

use super::calendar::{MS_PER_DAY, MS_PER_HOUR, MS_PER_MIN, MS_PER_SEC};
use crate::error::{MariaError, MariaResult};

/// A signed duration: `days` plus hours/minutes/seconds/milliseconds.
///
/// The `total_*` accessors report the magnitude only; consult
/// [`TimeSpan::negative`] for the direction.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeSpan {
    negative: bool,
    days: u32,
    hours: u8,
    minutes: u8,
    seconds: u8,
    milliseconds: u16,
}

fn check(field: &'static str, value: u32, limit: u32) -> MariaResult<()> {
    if value > limit {
        return Err(MariaError::TimeSpan {
            field,
            value,
            limit,
        });
    }
    Ok(())
}

impl TimeSpan {
    pub fn new(
        days: u32,
        hours: u32,
        minutes: u32,
        seconds: u32,
        milliseconds: u32,
        negative: bool,
    ) -> MariaResult<Self> {
        let mut span = Self {
            negative,
            days,
            ..Self::default()
        };
        span.set_hours(hours)?;
        span.set_minutes(minutes)?;
        span.set_seconds(seconds)?;
        span.set_milliseconds(milliseconds)?;
        Ok(span)
    }

    /// Span without a day component.
    pub fn from_hms(
        hours: u32,
        minutes: u32,
        seconds: u32,
        milliseconds: u32,
        negative: bool,
    ) -> MariaResult<Self> {
        Self::new(0, hours, minutes, seconds, milliseconds, negative)
    }

    /// Build from whole days plus a sub-day millisecond count (`< 86_400_000`).
    pub(crate) fn from_day_millis(days: u32, millis: u64, negative: bool) -> Self {
        let millis = millis % MS_PER_DAY as u64;
        Self {
            negative,
            days,
            hours: (millis / MS_PER_HOUR as u64) as u8,
            minutes: (millis % MS_PER_HOUR as u64 / MS_PER_MIN as u64) as u8,
            seconds: (millis % MS_PER_MIN as u64 / MS_PER_SEC as u64) as u8,
            milliseconds: (millis % MS_PER_SEC as u64) as u16,
        }
    }

    pub fn negative(&self) -> bool {
        self.negative
    }

    pub fn days(&self) -> u32 {
        self.days
    }

    pub fn hours(&self) -> u8 {
        self.hours
    }

    pub fn minutes(&self) -> u8 {
        self.minutes
    }

    pub fn seconds(&self) -> u8 {
        self.seconds
    }

    pub fn milliseconds(&self) -> u16 {
        self.milliseconds
    }

    pub fn set_negative(&mut self, negative: bool) -> bool {
        self.negative = negative;
        self.negative
    }

    pub fn set_days(&mut self, days: u32) -> u32 {
        self.days = days;
        self.days
    }

    pub fn set_hours(&mut self, hours: u32) -> MariaResult<u8> {
        check("hours", hours, 23)?;
        self.hours = hours as u8;
        Ok(self.hours)
    }

    pub fn set_minutes(&mut self, minutes: u32) -> MariaResult<u8> {
        check("minutes", minutes, 59)?;
        self.minutes = minutes as u8;
        Ok(self.minutes)
    }

    pub fn set_seconds(&mut self, seconds: u32) -> MariaResult<u8> {
        check("seconds", seconds, 60)?;
        self.seconds = seconds as u8;
        Ok(self.seconds)
    }

    pub fn set_milliseconds(&mut self, milliseconds: u32) -> MariaResult<u16> {
        check("milliseconds", milliseconds, 999)?;
        self.milliseconds = milliseconds as u16;
        Ok(self.milliseconds)
    }

    /// True when every component is zero, whatever the sign.
    pub fn zero(&self) -> bool {
        self.days == 0
            && self.hours == 0
            && self.minutes == 0
            && self.seconds == 0
            && self.milliseconds == 0
    }

    pub fn total_hours(&self) -> u64 {
        self.days as u64 * 24 + self.hours as u64
    }

    pub fn total_minutes(&self) -> u64 {
        self.total_hours() * 60 + self.minutes as u64
    }

    pub fn total_seconds(&self) -> u64 {
        self.total_minutes() * 60 + self.seconds as u64
    }

    pub fn total_milliseconds(&self) -> u64 {
        self.total_seconds() * 1000 + self.milliseconds as u64
    }

    /// -1, 0 or 1.
    pub fn compare(&self, other: &TimeSpan) -> i32 {
        match self.cmp(other) {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        }
    }

    fn components(&self) -> (u32, u8, u8, u8, u16) {
        (
            self.days,
            self.hours,
            self.minutes,
            self.seconds,
            self.milliseconds,
        )
    }
}

impl Ord for TimeSpan {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.zero() && other.zero() {
            return Ordering::Equal;
        }
        match (self.negative, other.negative) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => self.components().cmp(&other.components()),
        }
    }
}

impl PartialOrd for TimeSpan {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for TimeSpan {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TimeSpan {}

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            f.write_str("negative ")?;
        }
        write!(
            f,
            "{} days, {} hours, {} minutes, {} seconds, {} milliseconds",
            self.days, self.hours, self.minutes, self.seconds, self.milliseconds
        )
    }
}
