//! Text parsers for time-of-day and calendar values using nom.
//!
//! Fields are separated by any single non-digit character, so
//! `"13:37:42.007"`, `"13-37-42?007"` and `"13.37"` all parse.
//!
//! ```text
//! time       hh[?mm[?ss[?nnn]]]
//! date_time  yyyy[?mm[?dd[( |T)time]]]
//! ```

use nom::{
    branch::alt,
    character::complete::{char, digit1, satisfy, space0, space1},
    combinator::{map_res, opt, verify},
    sequence::preceded,
    IResult,
};

use crate::error::{MariaError, MariaResult};

/// Raw time-of-day fields; missing trailing fields are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeFields {
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub millisecond: u32,
}

/// Raw calendar fields; missing month or day default to 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTimeFields {
    pub year: u32,
    pub month: u32,
    pub day: u32,
    pub time: TimeFields,
}

/// Parse `hh[?mm[?ss[?nnn]]]`.
pub fn parse_time(input: &str) -> MariaResult<TimeFields> {
    match parse_time_fields(input) {
        Ok((rest, fields)) if rest.trim().is_empty() => Ok(fields),
        _ => Err(MariaError::format("time", input)),
    }
}

/// Parse `yyyy[?mm[?dd[ time]]]`.
pub fn parse_date_time(input: &str) -> MariaResult<DateTimeFields> {
    match parse_date_time_fields(input) {
        Ok((rest, fields)) if rest.trim().is_empty() => Ok(fields),
        _ => Err(MariaError::format("date time", input)),
    }
}

fn parse_number(input: &str) -> IResult<&str, u32> {
    map_res(digit1, str::parse::<u32>)(input)
}

fn parse_year(input: &str) -> IResult<&str, u32> {
    map_res(verify(digit1, |s: &str| s.len() >= 4), str::parse::<u32>)(input)
}

fn parse_delimiter(input: &str) -> IResult<&str, char> {
    satisfy(|c| !c.is_ascii_digit() && !c.is_whitespace())(input)
}

/// A delimiter followed by a number.
fn parse_next_field(input: &str) -> IResult<&str, u32> {
    preceded(parse_delimiter, parse_number)(input)
}

fn parse_time_fields(input: &str) -> IResult<&str, TimeFields> {
    let (input, _) = space0(input)?;
    let (input, hour) = parse_number(input)?;
    let (input, minute) = opt(parse_next_field)(input)?;
    let Some(minute) = minute else {
        return Ok((input, TimeFields { hour, ..TimeFields::default() }));
    };
    let (input, second) = opt(parse_next_field)(input)?;
    let Some(second) = second else {
        return Ok((input, TimeFields { hour, minute, ..TimeFields::default() }));
    };
    let (input, millisecond) = opt(parse_next_field)(input)?;

    Ok((
        input,
        TimeFields {
            hour,
            minute,
            second,
            millisecond: millisecond.unwrap_or(0),
        },
    ))
}

fn parse_date_time_fields(input: &str) -> IResult<&str, DateTimeFields> {
    let (input, _) = space0(input)?;
    let (input, year) = parse_year(input)?;
    let mut fields = DateTimeFields {
        year,
        month: 1,
        day: 1,
        time: TimeFields::default(),
    };

    let (input, month) = opt(parse_next_field)(input)?;
    let Some(month) = month else {
        return Ok((input, fields));
    };
    fields.month = month;

    let (input, day) = opt(parse_next_field)(input)?;
    let Some(day) = day else {
        return Ok((input, fields));
    };
    fields.day = day;

    if input.trim().is_empty() {
        return Ok((input, fields));
    }

    let (input, _) = alt((space1, preceded(char('T'), space0)))(input)?;
    let (input, time) = parse_time_fields(input)?;
    fields.time = time;
    Ok((input, fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(h: u32, m: u32, s: u32, ms: u32) -> TimeFields {
        TimeFields {
            hour: h,
            minute: m,
            second: s,
            millisecond: ms,
        }
    }

    #[test]
    fn test_time_delimiters() {
        assert_eq!(parse_time("13:37:42.007").unwrap(), time(13, 37, 42, 7));
        assert_eq!(parse_time("8:9:5-01").unwrap(), time(8, 9, 5, 1));
        assert_eq!(parse_time("18-59.59?0").unwrap(), time(18, 59, 59, 0));
        assert_eq!(parse_time(" 13").unwrap(), time(13, 0, 0, 0));
        assert_eq!(parse_time("13:37").unwrap(), time(13, 37, 0, 0));
    }

    #[test]
    fn test_time_rejects_garbage() {
        assert!(parse_time("").is_err());
        assert!(parse_time("a13").is_err());
        assert!(parse_time("23:59:a59.1000").is_err());
        assert!(parse_time("13:").is_err());
        assert!(parse_time("13:37:42.007 x").is_err());
    }

    #[test]
    fn test_out_of_range_values_still_parse() {
        // range checks belong to Time::new
        assert_eq!(parse_time("859").unwrap(), time(859, 0, 0, 0));
        assert_eq!(parse_time("23:59:59.1000").unwrap(), time(23, 59, 59, 1000));
    }

    #[test]
    fn test_date_time_fields() {
        let f = parse_date_time("2012-12-21 13:37:42.007").unwrap();
        assert_eq!((f.year, f.month, f.day), (2012, 12, 21));
        assert_eq!(f.time, time(13, 37, 42, 7));

        let f = parse_date_time("2012/12/21T01:02").unwrap();
        assert_eq!(f.time, time(1, 2, 0, 0));

        let f = parse_date_time("2012").unwrap();
        assert_eq!((f.year, f.month, f.day), (2012, 1, 1));

        let f = parse_date_time("2012-06").unwrap();
        assert_eq!((f.year, f.month, f.day), (2012, 6, 1));
    }

    #[test]
    fn test_date_time_rejects_garbage() {
        assert!(parse_date_time("2007-a02-29").is_err());
        assert!(parse_date_time("2007-02-29 a13:37:42").is_err());
        assert!(parse_date_time("113:37").is_err());
        assert!(parse_date_time("2007-02-29x13:37").is_err());
    }
}
