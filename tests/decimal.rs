//! Fixed-point decimal behavior.

use pretty_assertions::assert_eq;
use qail_mariadb::MariaError;
use qail_mariadb::types::Decimal;

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

#[test]
fn test_parse_and_format() {
    let d = dec("24.1234");
    assert_eq!(d.double(), 24.1234);
    assert_eq!(d.str(), "24.1234");
    assert_eq!(d.precision(), 4);
    assert_eq!(d.unbiased(), 241234);

    assert_eq!(dec("-1.50").str(), "-1.50");
    assert_eq!(dec("-0.05").str(), "-0.05");
    assert_eq!(dec("+7").str(), "7");
    assert_eq!(dec(".5").str(), "0.5");
    assert_eq!(dec("1.05").unbiased(), 105);
}

#[test]
fn test_malformed_input() {
    for input in ["", "abc", "1.2.3", "-", "1e5", "12,5"] {
        assert!(
            matches!(input.parse::<Decimal>(), Err(MariaError::Format { what: "decimal", .. })),
            "{:?}",
            input
        );
    }
    assert!(matches!(
        "0.12345678901234567890".parse::<Decimal>(),
        Err(MariaError::Decimal(_))
    ));
}

#[test]
fn test_add_then_subtract_restores() {
    let pairs = [("10.25", "0.5"), ("-3.125", "1.75"), ("0.001", "0.001"), ("100", "7")];
    for (a, b) in pairs {
        let original = dec(a);
        let mut d = original;
        d += dec(b);
        d -= dec(b);
        assert_eq!(d, original, "{} +/- {}", a, b);
        assert_eq!(d.str(), original.str());
    }
}

#[test]
fn test_mixed_precision_truncates_rhs() {
    let sum = dec("1.5") + dec("0.25");
    assert_eq!(sum.str(), "1.7");
    assert_eq!(sum.precision(), 1);

    let sum = dec("0.25") + dec("1.5");
    assert_eq!(sum.str(), "1.75");
}

#[test]
fn test_mul_div_round_half_away() {
    assert_eq!((dec("1.50") * dec("2.5")).str(), "3.75");
    assert_eq!((dec("1.00") / dec("3.0")).str(), "0.33");
    assert_eq!((dec("2.00") / dec("3.0")).str(), "0.67");
    assert_eq!((dec("-2.00") / dec("3.0")).str(), "-0.67");
    assert_eq!(Decimal::from_f64(-2.5, 0).unwrap().str(), "-3");
}

#[test]
fn test_checked_errors() {
    assert!(matches!(
        dec("1.0").checked_div(&dec("0.00")),
        Err(MariaError::Decimal(_))
    ));
    let big = Decimal::new(i64::MAX / 2, 0).unwrap();
    assert!(big.checked_mul(&Decimal::from_int(3, 0).unwrap()).is_err());
    assert!(big.checked_add(&big).is_ok());
    assert!(big.checked_add(&big).unwrap().checked_add(&big).is_err());
    assert!(Decimal::from_int(i64::MAX / 10, 2).is_err());
}

#[test]
fn test_comparison_is_exact() {
    assert_eq!(dec("1.5"), dec("1.50"));
    assert!(dec("0.1") < dec("0.11"));
    assert!(dec("-0.1") > dec("-0.11"));
    assert_eq!(dec("2").compare(&dec("1.999")), 1);
    assert_eq!(-dec("2.5"), dec("-2.5"));
    assert_eq!(dec("-2.5").abs(), dec("2.5"));
}

#[test]
fn test_rescale() {
    assert_eq!(dec("3.14159").with_precision(2).unwrap().str(), "3.14");
    assert_eq!(dec("3.1").with_precision(3).unwrap().str(), "3.100");
    assert_eq!(dec("-3.19").with_precision(1).unwrap().str(), "-3.1");
}
