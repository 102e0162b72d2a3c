//! Gregorian calendar utilities.
//!
//! Every date validation in the crate goes through [`valid_date`].

const MONTH_LENGTHS: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Largest year a [`DateTime`](super::DateTime) can hold.
pub const MAX_YEAR: u32 = u16::MAX as u32;

pub const MS_PER_SEC: i64 = 1_000;
pub const MS_PER_MIN: i64 = 60 * MS_PER_SEC;
pub const MS_PER_HOUR: i64 = 60 * MS_PER_MIN;
pub const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

/// Divisible by 400, or divisible by 4 and not by 100.
pub fn is_leap_year(year: u32) -> bool {
    year % 400 == 0 || (year % 4 == 0 && year % 100 != 0)
}

pub fn days_in_year(year: u32) -> u32 {
    if is_leap_year(year) { 366 } else { 365 }
}

/// Days in `month` (1-12) of `year`. Returns 0 for an invalid month.
pub fn days_in_month(year: u32, month: u32) -> u32 {
    if !(1..=12).contains(&month) {
        return 0;
    }
    let days = MONTH_LENGTHS[(month - 1) as usize];
    if month == 2 && is_leap_year(year) {
        days + 1
    } else {
        days
    }
}

pub fn valid_date(year: u32, month: u32, day: u32) -> bool {
    if year == 0 || year > MAX_YEAR || month == 0 || day == 0 {
        return false;
    }
    day <= days_in_month(year, month)
}

/// 1-based ordinal of the date within its year.
pub fn day_of_year(year: u32, month: u32, day: u32) -> u32 {
    (1..month).map(|m| days_in_month(year, m)).sum::<u32>() + day
}

/// Split a 1-based day-of-year back into `(month, day)`.
///
/// Returns `None` when `day_of_year` is 0 or past the end of the year.
pub fn month_and_day(year: u32, day_of_year: u32) -> Option<(u32, u32)> {
    if day_of_year == 0 || day_of_year > days_in_year(year) {
        return None;
    }
    let mut remaining = day_of_year;
    for month in 1..=12 {
        let days = days_in_month(year, month);
        if remaining <= days {
            return Some((month, remaining));
        }
        remaining -= days;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leap_years() {
        assert!(is_leap_year(2000));
        assert!(is_leap_year(2012));
        assert!(!is_leap_year(1900));
        assert!(!is_leap_year(2007));
        assert_eq!(days_in_year(2000), 366);
        assert_eq!(days_in_year(2001), 365);
    }

    #[test]
    fn test_days_in_month_bounds() {
        for year in [1, 1900, 1999, 2000, 2004, 2100, 2400] {
            for month in 1..=12 {
                let days = days_in_month(year, month);
                assert!((28..=31).contains(&days));
                assert!(valid_date(year, month, days));
                assert!(!valid_date(year, month, days + 1));
            }
            assert_eq!(days_in_month(year, 2) == 29, is_leap_year(year));
        }
    }

    #[test]
    fn test_valid_date_rejects_zero_fields() {
        assert!(!valid_date(0, 1, 1));
        assert!(!valid_date(2000, 0, 1));
        assert!(!valid_date(2000, 1, 0));
        assert!(!valid_date(2000, 13, 1));
        assert!(!valid_date(2007, 2, 29));
    }

    #[test]
    fn test_day_of_year_round_trip() {
        assert_eq!(day_of_year(2000, 1, 1), 1);
        assert_eq!(day_of_year(2000, 3, 1), 61);
        assert_eq!(day_of_year(2001, 3, 1), 60);
        assert_eq!(day_of_year(2000, 12, 31), 366);

        for year in [1999, 2000] {
            for doy in 1..=days_in_year(year) {
                let (m, d) = month_and_day(year, doy).unwrap();
                assert_eq!(day_of_year(year, m, d), doy);
            }
        }
        assert_eq!(month_and_day(2001, 366), None);
        assert_eq!(month_and_day(2001, 0), None);
    }
}
