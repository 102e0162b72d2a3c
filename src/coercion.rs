//! Compatibility between a column's actual type and the type an accessor asks for.
//!
//! Rules:
//! - `float32`, `double64`, `decimal`, `time`, `date_time`, `date` and
//!   `enumeration` need an exact match.
//! - Integers of the same width match regardless of sign.
//! - `boolean` also accepts `signed8` (TINYINT(1)).
//! - `string`, `blob`, `data` and `null` are interchangeable byte ranges.
//!
//! `ResultSet::get_value` skips this check and decodes whatever the column holds.

use crate::error::{MariaError, MariaResult};
use crate::types::ValueType;

fn integer_width(t: ValueType) -> Option<u8> {
    match t {
        ValueType::Unsigned8 | ValueType::Signed8 => Some(8),
        ValueType::Unsigned16 | ValueType::Signed16 => Some(16),
        ValueType::Unsigned32 | ValueType::Signed32 => Some(32),
        ValueType::Unsigned64 | ValueType::Signed64 => Some(64),
        _ => None,
    }
}

fn is_byte_range(t: ValueType) -> bool {
    matches!(
        t,
        ValueType::String | ValueType::Blob | ValueType::Data | ValueType::Null
    )
}

/// Whether an accessor for `requested` may read a column of type `actual`.
pub fn compatible(requested: ValueType, actual: ValueType) -> bool {
    if requested == actual {
        return true;
    }
    match requested {
        ValueType::Boolean => actual == ValueType::Signed8,
        r if is_byte_range(r) => is_byte_range(actual),
        r => match (integer_width(r), integer_width(actual)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

/// Fail with [`MariaError::TypeMismatch`] unless [`compatible`].
pub fn check(requested: ValueType, actual: ValueType) -> MariaResult<()> {
    if compatible(requested, actual) {
        Ok(())
    } else {
        Err(MariaError::TypeMismatch { requested, actual })
    }
}
