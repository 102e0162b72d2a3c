//! Fixed-point decimal stored as a scaled 64-bit integer.
//!
//! `value = real_value * 10^precision`. Binary operations keep the left-hand
//! precision: a right-hand operand with fewer fractional digits is rescaled
//! exactly, one with more digits is truncated toward zero. Comparisons are
//! exact regardless of precision.

use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

use crate::error::{MariaError, MariaResult};

/// Maximum number of fractional digits.
pub const MAX_PRECISION: u8 = 18;

const POWERS_OF_TEN: [i64; 19] = [
    1,
    10,
    100,
    1_000,
    10_000,
    100_000,
    1_000_000,
    10_000_000,
    100_000_000,
    1_000_000_000,
    10_000_000_000,
    100_000_000_000,
    1_000_000_000_000,
    10_000_000_000_000,
    100_000_000_000_000,
    1_000_000_000_000_000,
    10_000_000_000_000_000,
    100_000_000_000_000_000,
    1_000_000_000_000_000_000,
];

#[derive(Debug, Clone, Copy)]
pub struct Decimal {
    value: i64,
    precision: u8,
}

impl Default for Decimal {
    fn default() -> Self {
        Self {
            value: 0,
            precision: 4,
        }
    }
}

fn check_precision(precision: u8) -> MariaResult<()> {
    if precision > MAX_PRECISION {
        return Err(MariaError::Decimal(format!(
            "precision {} exceeds {}",
            precision, MAX_PRECISION
        )));
    }
    Ok(())
}

fn overflow(op: &str) -> MariaError {
    MariaError::Decimal(format!("overflow in {}", op))
}

/// `n / d` rounded half away from zero.
fn div_round(n: i128, d: i128) -> i128 {
    let q = n / d;
    let r = n % d;
    if 2 * r.abs() >= d.abs() {
        if (n < 0) == (d < 0) { q + 1 } else { q - 1 }
    } else {
        q
    }
}

impl Decimal {
    /// From an already scaled integer.
    pub fn new(value: i64, precision: u8) -> MariaResult<Self> {
        check_precision(precision)?;
        Ok(Self { value, precision })
    }

    /// `n` as a decimal with `precision` fractional digits.
    pub fn from_int(n: i64, precision: u8) -> MariaResult<Self> {
        check_precision(precision)?;
        let value = n
            .checked_mul(POWERS_OF_TEN[precision as usize])
            .ok_or_else(|| overflow("from_int"))?;
        Ok(Self { value, precision })
    }

    /// Round `n` to `precision` digits, half away from zero.
    pub fn from_f64(n: f64, precision: u8) -> MariaResult<Self> {
        check_precision(precision)?;
        let scaled = (n * POWERS_OF_TEN[precision as usize] as f64).round();
        if !scaled.is_finite() || scaled < i64::MIN as f64 || scaled >= i64::MAX as f64 {
            return Err(overflow("from_f64"));
        }
        Ok(Self {
            value: scaled as i64,
            precision,
        })
    }

    /// The scaled integer.
    pub fn unbiased(&self) -> i64 {
        self.value
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// `10^precision`
    pub fn factor(&self) -> i64 {
        POWERS_OF_TEN[self.precision as usize]
    }

    pub fn double(&self) -> f64 {
        self.value as f64 / self.factor() as f64
    }

    pub fn float32(&self) -> f32 {
        self.double() as f32
    }

    /// Panics when the scaled value is `i64::MIN`; see [`Decimal::checked_abs`].
    pub fn abs(&self) -> Self {
        match self.checked_abs() {
            Ok(d) => d,
            Err(e) => panic!("{}", e),
        }
    }

    pub fn checked_abs(&self) -> MariaResult<Self> {
        let value = self.value.checked_abs().ok_or_else(|| overflow("abs"))?;
        Ok(Self { value, ..*self })
    }

    pub fn checked_neg(&self) -> MariaResult<Self> {
        let value = self.value.checked_neg().ok_or_else(|| overflow("neg"))?;
        Ok(Self { value, ..*self })
    }

    /// The same number at another precision, truncating extra digits.
    pub fn with_precision(&self, precision: u8) -> MariaResult<Self> {
        check_precision(precision)?;
        Ok(Self {
            value: self.rescaled(precision, self.value)?,
            precision,
        })
    }

    fn rescaled(&self, precision: u8, value: i64) -> MariaResult<i64> {
        match precision.cmp(&self.precision) {
            Ordering::Equal => Ok(value),
            Ordering::Greater => value
                .checked_mul(POWERS_OF_TEN[(precision - self.precision) as usize])
                .ok_or_else(|| overflow("rescale")),
            Ordering::Less => Ok(value / POWERS_OF_TEN[(self.precision - precision) as usize]),
        }
    }

    /// `other`'s scaled value at this precision.
    fn convert(&self, other: &Decimal) -> MariaResult<i64> {
        other.rescaled(self.precision, other.value)
    }

    pub fn checked_add(&self, rhs: &Decimal) -> MariaResult<Self> {
        let value = self
            .value
            .checked_add(self.convert(rhs)?)
            .ok_or_else(|| overflow("add"))?;
        Ok(Self { value, ..*self })
    }

    pub fn checked_sub(&self, rhs: &Decimal) -> MariaResult<Self> {
        let value = self
            .value
            .checked_sub(self.convert(rhs)?)
            .ok_or_else(|| overflow("sub"))?;
        Ok(Self { value, ..*self })
    }

    pub fn checked_mul(&self, rhs: &Decimal) -> MariaResult<Self> {
        let product = div_round(self.value as i128 * rhs.value as i128, rhs.factor() as i128);
        let value = i64::try_from(product).map_err(|_| overflow("mul"))?;
        Ok(Self { value, ..*self })
    }

    pub fn checked_div(&self, rhs: &Decimal) -> MariaResult<Self> {
        if rhs.value == 0 {
            return Err(MariaError::Decimal("division by zero".into()));
        }
        let quotient = div_round(self.value as i128 * rhs.factor() as i128, rhs.value as i128);
        let value = i64::try_from(quotient).map_err(|_| overflow("div"))?;
        Ok(Self { value, ..*self })
    }

    /// -1, 0 or 1.
    pub fn compare(&self, other: &Decimal) -> i32 {
        self.cmp(other) as i32
    }

    /// `<integer>.<fraction>`; the fraction is zero-padded to `precision`
    /// digits. Negative values carry one leading `-` (`-0.05`). At precision
    /// 0 the `.` is dropped as well, so `42` rather than `42.`.
    pub fn str(&self) -> String {
        if self.precision == 0 {
            return self.value.to_string();
        }
        let factor = self.factor().unsigned_abs();
        let magnitude = self.value.unsigned_abs();
        format!(
            "{}{}.{:0width$}",
            if self.value < 0 { "-" } else { "" },
            magnitude / factor,
            magnitude % factor,
            width = self.precision as usize
        )
    }
}

impl FromStr for Decimal {
    type Err = MariaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let (negative, digits) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));

        let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
        if (int_part.is_empty() && frac_part.is_empty())
            || !all_digits(int_part)
            || !all_digits(frac_part)
        {
            return Err(MariaError::format("decimal", s));
        }
        if frac_part.len() > MAX_PRECISION as usize {
            return Err(MariaError::Decimal(format!(
                "'{}' has more than {} fractional digits",
                s, MAX_PRECISION
            )));
        }

        let precision = frac_part.len() as u8;
        let parse = |p: &str| -> MariaResult<i64> {
            if p.is_empty() {
                return Ok(0);
            }
            p.parse::<i64>().map_err(|_| overflow("parse"))
        };
        // fraction digits keep their position: "1.05" is 100 + 5
        let value = parse(int_part)?
            .checked_mul(POWERS_OF_TEN[precision as usize])
            .and_then(|v| v.checked_add(parse(frac_part).ok()?))
            .ok_or_else(|| overflow("parse"))?;

        Ok(Self {
            value: if negative { -value } else { value },
            precision,
        })
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.str())
    }
}

impl Serialize for Decimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.str())
    }
}

// ==================== Comparison ====================

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        let precision = self.precision.max(other.precision);
        let widen = |d: &Decimal| {
            d.value as i128 * POWERS_OF_TEN[(precision - d.precision) as usize] as i128
        };
        widen(self).cmp(&widen(other))
    }
}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Decimal {}

// ==================== Arithmetic ====================
//
// The operators (and `Neg`) panic on overflow or division by zero, like the
// primitive integer operators. Use the `checked_*` methods to get an error instead.

macro_rules! decimal_op {
    ($trait:ident, $method:ident, $assign_trait:ident, $assign_method:ident, $checked:ident) => {
        impl $trait for Decimal {
            type Output = Decimal;

            fn $method(self, rhs: Decimal) -> Decimal {
                match self.$checked(&rhs) {
                    Ok(d) => d,
                    Err(e) => panic!("{}", e),
                }
            }
        }

        impl $assign_trait for Decimal {
            fn $assign_method(&mut self, rhs: Decimal) {
                *self = $trait::$method(*self, rhs);
            }
        }
    };
}

decimal_op!(Add, add, AddAssign, add_assign, checked_add);
decimal_op!(Sub, sub, SubAssign, sub_assign, checked_sub);
decimal_op!(Mul, mul, MulAssign, mul_assign, checked_mul);
decimal_op!(Div, div, DivAssign, div_assign, checked_div);

impl Neg for Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        match self.checked_neg() {
            Ok(d) => d,
            Err(e) => panic!("{}", e),
        }
    }
}
