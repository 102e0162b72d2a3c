//! Calendar and time arithmetic properties.

use pretty_assertions::assert_eq;
use qail_mariadb::MariaError;
use qail_mariadb::types::calendar::{days_in_month, days_in_year, is_leap_year, valid_date};
use qail_mariadb::types::{DateTime, Time, TimeSpan};

fn dt(s: &str) -> DateTime {
    s.parse().unwrap()
}

#[test]
fn test_month_lengths() {
    for year in 1..=2400 {
        for month in 1..=12 {
            let days = days_in_month(year, month);
            assert!((28..=31).contains(&days), "{}-{}", year, month);
            assert!(valid_date(year, month, days));
            assert!(!valid_date(year, month, days + 1));
        }
        assert_eq!(days_in_month(year, 2) == 29, is_leap_year(year), "{}", year);
    }
    assert!(is_leap_year(2000));
    assert!(!is_leap_year(1900));
    assert!(is_leap_year(2024));
}

#[test]
fn test_parse_matches_components() {
    assert_eq!(
        dt("2000-01-02 03:04:05.666"),
        DateTime::new(2000, 1, 2, 3, 4, 5, 666).unwrap()
    );
    assert_eq!(dt("2000-01-02"), DateTime::from_date(2000, 1, 2).unwrap());
    assert_eq!(
        "03:04:05.666".parse::<Time>().unwrap(),
        Time::new(3, 4, 5, 666).unwrap()
    );
}

#[test]
fn test_add_days_and_format() {
    let start = DateTime::new(2000, 1, 2, 3, 4, 5, 666).unwrap();
    let later = start.add_days(10).unwrap();
    assert_eq!(later, DateTime::new(2000, 1, 12, 3, 4, 5, 666).unwrap());
    assert_eq!(later.str(false), "2000-01-12 03:04:05");
    assert_eq!(later.str(true), "2000-01-12 03:04:05.666");

    assert_eq!(dt("2023-12-25 10:00:00").add_days(10).unwrap(), dt("2024-01-04 10:00:00"));
    assert_eq!(dt("2024-03-01").add_days(-1).unwrap(), dt("2024-02-29"));
    assert_eq!(dt("2000-01-01").add_days(366).unwrap(), dt("2001-01-01"));
}

#[test]
fn test_reverse_day_of_year() {
    for year in [1999, 2000, 2023, 2024] {
        for day_of_year in 1..=days_in_year(year) {
            let date = DateTime::reverse_day_of_year(year, day_of_year).unwrap();
            assert_eq!(date.day_of_year(), day_of_year);
        }
    }

    let sample = DateTime::new(2024, 10, 19, 17, 45, 12, 5).unwrap();
    assert_eq!(
        DateTime::reverse_day_of_year(2024, sample.day_of_year()).unwrap(),
        sample.date()
    );
    assert!(DateTime::reverse_day_of_year(2023, 366).is_err());
}

#[test]
fn test_time_between_symmetry() {
    let points = [
        dt("2000-01-01 00:00:00"),
        dt("2000-01-01 23:59:59.999"),
        dt("2000-02-29 12:00:00"),
        dt("2001-03-01 06:30:00.250"),
        dt("2024-10-19 08:15:00"),
    ];
    for a in &points {
        for b in &points {
            if a == b {
                continue;
            }
            let forward = a.time_between(b);
            let backward = b.time_between(a);
            assert_eq!(forward.total_milliseconds(), backward.total_milliseconds());
            assert_ne!(forward.negative(), backward.negative());
            assert_eq!(a.add(&b.time_between(a)).unwrap(), *b);
        }
    }
}

#[test]
fn test_time_between_crosses_midnight() {
    let span = dt("2000-01-02 01:00:00").time_between(&dt("2000-01-01 23:00:00"));
    assert_eq!(span, TimeSpan::from_hms(2, 0, 0, 0, false).unwrap());
}

#[test]
fn test_time_of_day_wraps() {
    let late = Time::new(23, 30, 0, 0).unwrap();
    assert_eq!(late.add_minutes(45), Time::new(0, 15, 0, 0).unwrap());
    assert_eq!(
        Time::new(0, 30, 0, 0).unwrap().add_hours(-1),
        Time::new(23, 30, 0, 0).unwrap()
    );

    let span = Time::new(1, 0, 0, 0).unwrap().time_between(&late);
    assert!(span.negative());
    assert_eq!(span.total_minutes(), 22 * 60 + 30);
}

#[test]
fn test_date_time_carries_days() {
    let start = dt("2024-02-28 22:00:00");
    assert_eq!(start.add_hours(3).unwrap(), dt("2024-02-29 01:00:00"));
    assert_eq!(start.add_hours(27).unwrap(), dt("2024-03-01 01:00:00"));
    assert_eq!(start.add_milliseconds(-1).unwrap(), dt("2024-02-28 21:59:59.999"));

    let span = TimeSpan::new(1, 2, 0, 0, 0, true).unwrap();
    assert_eq!(start.add(&span).unwrap(), dt("2024-02-27 20:00:00"));
    assert_eq!(start.subtract(&span).unwrap(), dt("2024-03-01 00:00:00"));
}

#[test]
fn test_months_and_years() {
    assert_eq!(dt("2024-01-15").add_months(13).unwrap(), dt("2025-02-15"));
    assert_eq!(dt("2024-01-15").add_months(-1).unwrap(), dt("2023-12-15"));
    assert_eq!(dt("2024-02-29").add_years(4).unwrap(), dt("2028-02-29"));
}

#[test]
fn test_span_validation() {
    assert!(matches!(
        TimeSpan::new(0, 24, 0, 0, 0, false),
        Err(MariaError::TimeSpan { field: "hours", value: 24, .. })
    ));
    assert!(TimeSpan::new(0, 0, 60, 0, 0, false).is_err());
    assert!(TimeSpan::new(0, 0, 0, 0, 1000, false).is_err());

    let span = TimeSpan::new(1, 3, 0, 0, 0, false).unwrap();
    assert_eq!(span.total_hours(), 27);
}

#[test]
fn test_invalid_components_are_reported() {
    let err = DateTime::new(2023, 2, 29, 0, 0, 0, 0).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Invalid date time: year - 2023, month - 2, day - 29, hour - 0, minute - 0, second - 0, millisecond - 0"
    );
    assert!(matches!(
        Time::new(12, 60, 0, 0),
        Err(MariaError::Time { minute: 60, .. })
    ));
    assert!("2024-13-01".parse::<DateTime>().is_err());
}

#[test]
fn test_ordering() {
    assert!(dt("2024-01-01 00:00:00.001") > dt("2024-01-01"));
    assert_eq!(dt("2024-01-01").compare(&dt("2023-12-31 23:59:59")), 1);
    assert_eq!(
        TimeSpan::from_hms(1, 0, 0, 0, true)
            .unwrap()
            .compare(&TimeSpan::from_hms(0, 0, 0, 1, false).unwrap()),
        -1
    );
}
