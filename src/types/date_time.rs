//! Calendar date plus time of day.
//!
//! A `DateTime` holds a [`Time`] and the year/month/day fields. All date
//! validation is delegated to [`calendar::valid_date`].
//!
//! Lower-order arithmetic carries into higher-order fields using euclidean
//! division, so negative deltas borrow correctly across day, month and year
//! boundaries.

use chrono::{Datelike, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::calendar::{self, MAX_YEAR, MS_PER_DAY, MS_PER_HOUR, MS_PER_MIN, MS_PER_SEC};
use super::native::{NativeTime, TimeKind};
use super::parse::parse_date_time;
use super::time::Time;
use super::time_span::TimeSpan;
use crate::error::{MariaError, MariaResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateTime {
    year: u16,
    month: u8,
    day: u8,
    time: Time,
}

impl Default for DateTime {
    /// 1900-01-01 00:00:00.000
    fn default() -> Self {
        Self::from_time(Time::default())
    }
}

fn invalid(
    year: u32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
    millisecond: u32,
) -> MariaError {
    MariaError::DateTime {
        year,
        month,
        day,
        hour,
        minute,
        second,
        millisecond,
    }
}

impl DateTime {
    pub fn new(
        year: u32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
        millisecond: u32,
    ) -> MariaResult<Self> {
        if !calendar::valid_date(year, month, day) {
            return Err(invalid(year, month, day, hour, minute, second, millisecond));
        }
        let time = Time::new(hour, minute, second, millisecond)
            .map_err(|_| invalid(year, month, day, hour, minute, second, millisecond))?;
        Ok(Self {
            year: year as u16,
            month: month as u8,
            day: day as u8,
            time,
        })
    }

    /// Midnight on the given date.
    pub fn from_date(year: u32, month: u32, day: u32) -> MariaResult<Self> {
        Self::new(year, month, day, 0, 0, 0, 0)
    }

    /// `time` on 1900-01-01.
    pub fn from_time(time: Time) -> Self {
        Self {
            year: 1900,
            month: 1,
            day: 1,
            time,
        }
    }

    /// From a unix timestamp, broken down in local time or UTC.
    pub fn from_timestamp(secs: i64, utc: bool) -> MariaResult<Self> {
        let naive = if utc {
            Utc.timestamp_opt(secs, 0).single().map(|t| t.naive_utc())
        } else {
            Local.timestamp_opt(secs, 0).single().map(|t| t.naive_local())
        };
        naive
            .ok_or_else(|| MariaError::format("timestamp", secs.to_string()))
            .and_then(Self::try_from)
    }

    /// From a wire temporal struct. A `Time`-only struct lands on 1900-01-01.
    pub fn from_native(t: &NativeTime) -> MariaResult<Self> {
        if t.kind == TimeKind::Time {
            return Time::from_native(t).map(Self::from_time);
        }
        Self::new(
            t.year as u32,
            t.month as u32,
            t.day as u32,
            t.hour,
            t.minute as u32,
            t.second as u32,
            t.millisecond(),
        )
    }

    pub fn now() -> Self {
        Self::from_chrono(Local::now().naive_local())
    }

    pub fn now_utc() -> Self {
        Self::from_chrono(Utc::now().naive_utc())
    }

    fn from_chrono(naive: NaiveDateTime) -> Self {
        Self::try_from(naive).unwrap_or_default()
    }

    /// Date of the `day_of_year`-th day (1-based) of `year`.
    pub fn reverse_day_of_year(year: u32, day_of_year: u32) -> MariaResult<Self> {
        let (month, day) = calendar::month_and_day(year, day_of_year)
            .ok_or_else(|| invalid(year, 0, day_of_year, 0, 0, 0, 0))?;
        Self::from_date(year, month, day)
    }

    pub fn year(&self) -> u16 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn day(&self) -> u8 {
        self.day
    }

    pub fn hour(&self) -> u8 {
        self.time.hour()
    }

    pub fn minute(&self) -> u8 {
        self.time.minute()
    }

    pub fn second(&self) -> u8 {
        self.time.second()
    }

    pub fn millisecond(&self) -> u16 {
        self.time.millisecond()
    }

    /// The time-of-day part.
    pub fn time(&self) -> Time {
        self.time
    }

    fn error_with(&self, f: impl FnOnce(&mut [u32; 7])) -> MariaError {
        let mut v = [
            self.year as u32,
            self.month as u32,
            self.day as u32,
            self.hour() as u32,
            self.minute() as u32,
            self.second() as u32,
            self.millisecond() as u32,
        ];
        f(&mut v);
        invalid(v[0], v[1], v[2], v[3], v[4], v[5], v[6])
    }

    /// Set the year. A day that no longer exists (Feb 29) resets to 1.
    pub fn set_year(&mut self, year: u32) -> MariaResult<u16> {
        if year == 0 || year > MAX_YEAR {
            return Err(self.error_with(|v| v[0] = year));
        }
        self.year = year as u16;
        if !calendar::valid_date(year, self.month as u32, self.day as u32) {
            self.day = 1;
        }
        Ok(self.year)
    }

    /// Set the month. A day past the end of the new month resets to 1.
    pub fn set_month(&mut self, month: u32) -> MariaResult<u8> {
        if !(1..=12).contains(&month) {
            return Err(self.error_with(|v| v[1] = month));
        }
        self.month = month as u8;
        if !calendar::valid_date(self.year as u32, month, self.day as u32) {
            self.day = 1;
        }
        Ok(self.month)
    }

    pub fn set_day(&mut self, day: u32) -> MariaResult<u8> {
        if !calendar::valid_date(self.year as u32, self.month as u32, day) {
            return Err(self.error_with(|v| v[2] = day));
        }
        self.day = day as u8;
        Ok(self.day)
    }

    pub fn set_hour(&mut self, hour: u32) -> MariaResult<u8> {
        let err = self.error_with(|v| v[3] = hour);
        self.time.set_hour(hour).map_err(|_| err)
    }

    pub fn set_minute(&mut self, minute: u32) -> MariaResult<u8> {
        let err = self.error_with(|v| v[4] = minute);
        self.time.set_minute(minute).map_err(|_| err)
    }

    pub fn set_second(&mut self, second: u32) -> MariaResult<u8> {
        let err = self.error_with(|v| v[5] = second);
        self.time.set_second(second).map_err(|_| err)
    }

    pub fn set_millisecond(&mut self, millisecond: u32) -> MariaResult<u16> {
        let err = self.error_with(|v| v[6] = millisecond);
        self.time.set_millisecond(millisecond).map_err(|_| err)
    }

    pub fn day_of_year(&self) -> u32 {
        calendar::day_of_year(self.year as u32, self.month as u32, self.day as u32)
    }

    /// Move to the `day_of_year`-th day of the current year.
    pub fn set_day_of_year(&mut self, day_of_year: u32) -> MariaResult<u32> {
        let date = Self::reverse_day_of_year(self.year as u32, day_of_year)?;
        self.month = date.month;
        self.day = date.day;
        Ok(day_of_year)
    }

    fn with_date(&self, year: i64, month: u32, day: u32) -> MariaResult<Self> {
        if year < 1 || year > MAX_YEAR as i64 {
            return Err(self.error_with(|v| v[0] = year.clamp(0, u32::MAX as i64) as u32));
        }
        let day = if calendar::valid_date(year as u32, month, day) {
            day
        } else {
            1
        };
        Ok(Self {
            year: year as u16,
            month: month as u8,
            day: day as u8,
            time: self.time,
        })
    }

    pub fn add_years(&self, years: i32) -> MariaResult<Self> {
        if years == 0 {
            return Ok(*self);
        }
        self.with_date(
            self.year as i64 + years as i64,
            self.month as u32,
            self.day as u32,
        )
    }

    pub fn add_months(&self, months: i32) -> MariaResult<Self> {
        if months == 0 {
            return Ok(*self);
        }
        let total = self.year as i64 * 12 + (self.month as i64 - 1) + months as i64;
        self.with_date(
            total.div_euclid(12),
            (total.rem_euclid(12) + 1) as u32,
            self.day as u32,
        )
    }

    pub fn add_days(&self, days: i64) -> MariaResult<Self> {
        if days == 0 {
            return Ok(*self);
        }
        let out_of_range = |year: i64| self.error_with(|v| v[0] = year.clamp(0, u32::MAX as i64) as u32);
        let mut year = self.year as i64;
        let mut day_of_year = (self.day_of_year() as i64)
            .checked_add(days)
            .ok_or_else(|| out_of_range(if days > 0 { i64::MAX } else { 0 }))?;

        while day_of_year > calendar::days_in_year(year as u32) as i64 {
            day_of_year -= calendar::days_in_year(year as u32) as i64;
            year += 1;
            if year > MAX_YEAR as i64 {
                return Err(out_of_range(year));
            }
        }
        while day_of_year < 1 {
            year -= 1;
            if year < 1 {
                return Err(out_of_range(year));
            }
            day_of_year += calendar::days_in_year(year as u32) as i64;
        }

        let date = Self::reverse_day_of_year(year as u32, day_of_year as u32)?;
        Ok(Self {
            time: self.time,
            ..date
        })
    }

    pub fn add_hours(&self, hours: i64) -> MariaResult<Self> {
        self.add_milliseconds(self.scaled(hours, MS_PER_HOUR)?)
    }

    pub fn add_minutes(&self, minutes: i64) -> MariaResult<Self> {
        self.add_milliseconds(self.scaled(minutes, MS_PER_MIN)?)
    }

    pub fn add_seconds(&self, seconds: i64) -> MariaResult<Self> {
        self.add_milliseconds(self.scaled(seconds, MS_PER_SEC)?)
    }

    pub fn add_milliseconds(&self, milliseconds: i64) -> MariaResult<Self> {
        if milliseconds == 0 {
            return Ok(*self);
        }
        let total = self
            .time
            .ms_of_day()
            .checked_add(milliseconds)
            .ok_or_else(|| self.error_with(|v| v[0] = u32::MAX))?;
        let shifted = self.add_days(total.div_euclid(MS_PER_DAY))?;
        Ok(Self {
            time: Time::from_ms_of_day(total.rem_euclid(MS_PER_DAY)),
            ..shifted
        })
    }

    fn scaled(&self, value: i64, unit: i64) -> MariaResult<i64> {
        value
            .checked_mul(unit)
            .ok_or_else(|| self.error_with(|v| v[0] = u32::MAX))
    }

    /// Apply every component of `span`, days included, honoring its sign.
    pub fn add(&self, span: &TimeSpan) -> MariaResult<Self> {
        let total = span.total_milliseconds() as i64;
        self.add_milliseconds(if span.negative() { -total } else { total })
    }

    pub fn subtract(&self, span: &TimeSpan) -> MariaResult<Self> {
        let mut inverted = *span;
        inverted.set_negative(!span.negative());
        self.add(&inverted)
    }

    /// Add a time of day as a duration.
    pub fn add_time(&self, time: &Time) -> MariaResult<Self> {
        self.add_milliseconds(time.ms_of_day())
    }

    pub fn subtract_time(&self, time: &Time) -> MariaResult<Self> {
        self.add_milliseconds(-time.ms_of_day())
    }

    /// Whole days from `earlier`'s date to this date.
    fn days_since(&self, earlier: &DateTime) -> i64 {
        let years: i64 = (earlier.year as u32..self.year as u32)
            .map(|y| calendar::days_in_year(y) as i64)
            .sum();
        years + self.day_of_year() as i64 - earlier.day_of_year() as i64
    }

    /// Span from `other` forward to `self`.
    ///
    /// When `other` is later the result is `other.time_between(self)`
    /// flagged negative, so `b == a.add(&b.time_between(&a))` holds.
    /// Leap seconds count as milliseconds past the end of their day.
    pub fn time_between(&self, other: &DateTime) -> TimeSpan {
        let total = if self >= other {
            self.ms_since(other)
        } else {
            -other.ms_since(self)
        };
        let magnitude = total.unsigned_abs();
        TimeSpan::from_day_millis(
            (magnitude / MS_PER_DAY as u64) as u32,
            magnitude % MS_PER_DAY as u64,
            total < 0,
        )
    }

    /// Signed milliseconds from `earlier` to `self`; `earlier` must not sort after `self`.
    fn ms_since(&self, earlier: &DateTime) -> i64 {
        self.days_since(earlier) * MS_PER_DAY + self.time.ms_of_day() - earlier.time.ms_of_day()
    }

    /// Same date at midnight.
    pub fn date(&self) -> Self {
        Self {
            time: Time::default(),
            ..*self
        }
    }

    /// -1, 0 or 1, ordering by date then time.
    pub fn compare(&self, other: &DateTime) -> i32 {
        self.cmp(other) as i32
    }

    /// `yyyy-mm-dd hh:mm:ss`, or with `.nnn` appended.
    pub fn str(&self, with_millisecond: bool) -> String {
        format!("{} {}", self.str_date(), self.time.str_time(with_millisecond))
    }

    /// `yyyy-mm-dd`
    pub fn str_date(&self) -> String {
        format!("{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }

    /// Wire temporal struct; `kind` is `Date` when the time part is midnight.
    pub fn native_time(&self) -> NativeTime {
        let kind = if self.time == Time::default() {
            TimeKind::Date
        } else {
            TimeKind::DateTime
        };
        NativeTime {
            year: self.year,
            month: self.month,
            day: self.day,
            kind,
            ..self.time.native_time()
        }
    }
}

impl TryFrom<NaiveDateTime> for DateTime {
    type Error = MariaError;

    fn try_from(t: NaiveDateTime) -> Result<Self, Self::Error> {
        let year = u32::try_from(t.year()).unwrap_or(0);
        let time = Time::from(t.time());
        if !calendar::valid_date(year, t.month(), t.day()) {
            return Err(invalid(
                year,
                t.month(),
                t.day(),
                time.hour() as u32,
                time.minute() as u32,
                time.second() as u32,
                time.millisecond() as u32,
            ));
        }
        Ok(Self {
            year: year as u16,
            month: t.month() as u8,
            day: t.day() as u8,
            time,
        })
    }
}

impl FromStr for DateTime {
    type Err = MariaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let f = parse_date_time(s)?;
        Self::new(
            f.year,
            f.month,
            f.day,
            f.time.hour,
            f.time.minute,
            f.time.second,
            f.time.millisecond,
        )
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.str(true))
    }
}

impl Serialize for DateTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.str(true))
    }
}
