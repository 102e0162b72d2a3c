//! Wall-clock time of day with millisecond resolution.
//!
//! Arithmetic wraps around midnight: `Time` has no date, so carrying into
//! a day is dropped rather than reported.

use chrono::{Local, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::calendar::{MS_PER_DAY, MS_PER_HOUR, MS_PER_MIN, MS_PER_SEC};
use super::native::{NativeTime, TimeKind};
use super::parse::parse_time;
use super::time_span::TimeSpan;
use crate::error::{MariaError, MariaResult};

/// Time of day: hour 0-23, minute 0-59, second 0-61 (leap tolerant),
/// millisecond 0-999.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time {
    hour: u8,
    minute: u8,
    second: u8,
    millisecond: u16,
}

impl Time {
    pub fn new(hour: u32, minute: u32, second: u32, millisecond: u32) -> MariaResult<Self> {
        if !Self::valid(hour, minute, second, millisecond) {
            return Err(MariaError::Time {
                hour,
                minute,
                second,
                millisecond,
            });
        }
        Ok(Self {
            hour: hour as u8,
            minute: minute as u8,
            second: second as u8,
            millisecond: millisecond as u16,
        })
    }

    pub fn valid(hour: u32, minute: u32, second: u32, millisecond: u32) -> bool {
        hour < 24 && minute < 60 && second < 62 && millisecond < 1000
    }

    /// From a unix timestamp, broken down in local time or UTC.
    pub fn from_timestamp(secs: i64, utc: bool) -> MariaResult<Self> {
        let naive = if utc {
            Utc.timestamp_opt(secs, 0).single().map(|t| t.naive_utc())
        } else {
            Local.timestamp_opt(secs, 0).single().map(|t| t.naive_local())
        };
        naive
            .map(|t| Self::from(t.time()))
            .ok_or_else(|| MariaError::format("timestamp", secs.to_string()))
    }

    /// From a wire temporal struct; only the time fields are read.
    pub fn from_native(t: &NativeTime) -> MariaResult<Self> {
        Self::new(
            t.hour,
            t.minute as u32,
            t.second as u32,
            t.millisecond(),
        )
    }

    /// Current local time.
    pub fn now() -> Self {
        Self::from(Local::now().naive_local().time())
    }

    /// Current UTC time.
    pub fn now_utc() -> Self {
        Self::from(Utc::now().naive_utc().time())
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn second(&self) -> u8 {
        self.second
    }

    pub fn millisecond(&self) -> u16 {
        self.millisecond
    }

    pub fn set_hour(&mut self, hour: u32) -> MariaResult<u8> {
        *self = Self::new(hour, self.minute as u32, self.second as u32, self.millisecond as u32)?;
        Ok(self.hour)
    }

    pub fn set_minute(&mut self, minute: u32) -> MariaResult<u8> {
        *self = Self::new(self.hour as u32, minute, self.second as u32, self.millisecond as u32)?;
        Ok(self.minute)
    }

    pub fn set_second(&mut self, second: u32) -> MariaResult<u8> {
        *self = Self::new(self.hour as u32, self.minute as u32, second, self.millisecond as u32)?;
        Ok(self.second)
    }

    pub fn set_millisecond(&mut self, millisecond: u32) -> MariaResult<u16> {
        *self = Self::new(self.hour as u32, self.minute as u32, self.second as u32, millisecond)?;
        Ok(self.millisecond)
    }

    /// -1, 0 or 1, ordering hour, minute, second, millisecond.
    pub fn compare(&self, other: &Time) -> i32 {
        self.cmp(other) as i32
    }

    pub(crate) fn ms_of_day(&self) -> i64 {
        self.hour as i64 * MS_PER_HOUR
            + self.minute as i64 * MS_PER_MIN
            + self.second as i64 * MS_PER_SEC
            + self.millisecond as i64
    }

    pub(crate) fn from_ms_of_day(ms: i64) -> Self {
        let ms = ms.rem_euclid(MS_PER_DAY);
        Self {
            hour: (ms / MS_PER_HOUR) as u8,
            minute: (ms % MS_PER_HOUR / MS_PER_MIN) as u8,
            second: (ms % MS_PER_MIN / MS_PER_SEC) as u8,
            millisecond: (ms % MS_PER_SEC) as u16,
        }
    }

    fn shift(&self, delta_ms: i64) -> Self {
        if delta_ms == 0 {
            return *self;
        }
        Self::from_ms_of_day(self.ms_of_day() + delta_ms)
    }

    pub fn add_hours(&self, hours: i64) -> Self {
        self.shift((hours % 24) * MS_PER_HOUR)
    }

    pub fn add_minutes(&self, minutes: i64) -> Self {
        self.shift((minutes % (24 * 60)) * MS_PER_MIN)
    }

    pub fn add_seconds(&self, seconds: i64) -> Self {
        self.shift((seconds % (24 * 60 * 60)) * MS_PER_SEC)
    }

    pub fn add_milliseconds(&self, milliseconds: i64) -> Self {
        self.shift(milliseconds % MS_PER_DAY)
    }

    /// Apply the sub-day components of `span`; its days are ignored.
    pub fn add(&self, span: &TimeSpan) -> Self {
        let sign = if span.negative() { -1 } else { 1 };
        self.add_hours(sign * span.hours() as i64)
            .add_minutes(sign * span.minutes() as i64)
            .add_seconds(sign * span.seconds() as i64)
            .add_milliseconds(sign * span.milliseconds() as i64)
    }

    pub fn subtract(&self, span: &TimeSpan) -> Self {
        let mut inverted = *span;
        inverted.set_negative(!span.negative());
        self.add(&inverted)
    }

    /// Span from `other` forward to `self`, wrapping through midnight.
    ///
    /// When `other` is later than `self` the result is
    /// `other.time_between(self)` flagged negative.
    pub fn time_between(&self, other: &Time) -> TimeSpan {
        if self == other {
            return TimeSpan::default();
        }
        if other > self {
            let mut span = other.time_between(self);
            span.set_negative(true);
            return span;
        }

        let ms = self.ms_of_day();
        let other_ms = other.ms_of_day();
        let total = if other_ms > ms {
            MS_PER_DAY - (other_ms - ms)
        } else {
            ms - other_ms
        };
        TimeSpan::from_day_millis(0, total as u64, false)
    }

    /// `hh:mm:ss`, or `hh:mm:ss.nnn` with milliseconds.
    pub fn str_time(&self, with_millisecond: bool) -> String {
        if with_millisecond {
            format!(
                "{:02}:{:02}:{:02}.{:03}",
                self.hour, self.minute, self.second, self.millisecond
            )
        } else {
            format!("{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
        }
    }

    /// Wire temporal struct with `kind == Time`.
    pub fn native_time(&self) -> NativeTime {
        NativeTime {
            hour: self.hour as u32,
            minute: self.minute,
            second: self.second,
            second_part: self.millisecond as u32 * 1000,
            kind: TimeKind::Time,
            ..NativeTime::default()
        }
    }
}

impl From<NaiveTime> for Time {
    fn from(t: NaiveTime) -> Self {
        // chrono encodes a leap second as nanosecond >= 1e9
        let (second, nanos) = if t.nanosecond() >= 1_000_000_000 {
            (t.second() + 1, t.nanosecond() - 1_000_000_000)
        } else {
            (t.second(), t.nanosecond())
        };
        Self {
            hour: t.hour() as u8,
            minute: t.minute() as u8,
            second: second as u8,
            millisecond: (nanos / 1_000_000) as u16,
        }
    }
}

impl FromStr for Time {
    type Err = MariaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let f = parse_time(s)?;
        Self::new(f.hour, f.minute, f.second, f.millisecond)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.str_time(true))
    }
}

impl Serialize for Time {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.str_time(true))
    }
}
