//! Value types exchanged with MariaDB.
//!
//! Calendar, time-of-day, duration and fixed-point values live in the
//! submodules; this module holds the type tags shared by the binding and
//! result layers.

pub mod calendar;
pub mod date_time;
pub mod decimal;
pub mod native;
pub mod parse;
pub mod time;
pub mod time_span;

pub use date_time::DateTime;
pub use decimal::Decimal;
pub use native::{NativeTime, TimeKind};
pub use time::Time;
pub use time_span::TimeSpan;

use serde::Serialize;
use std::fmt;

/// Caller-facing type of a column or accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Null,
    Blob,
    Data,
    Date,
    DateTime,
    Time,
    String,
    Boolean,
    Decimal,
    Unsigned8,
    Signed8,
    Unsigned16,
    Signed16,
    Unsigned32,
    Signed32,
    Unsigned64,
    Signed64,
    Float32,
    Double64,
    Enumeration,
}

impl ValueType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Blob => "blob",
            Self::Data => "data",
            Self::Date => "date",
            Self::DateTime => "date_time",
            Self::Time => "time",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Decimal => "decimal",
            Self::Unsigned8 => "unsigned8",
            Self::Signed8 => "signed8",
            Self::Unsigned16 => "unsigned16",
            Self::Signed16 => "signed16",
            Self::Unsigned32 => "unsigned32",
            Self::Signed32 => "signed32",
            Self::Unsigned64 => "unsigned64",
            Self::Signed64 => "signed64",
            Self::Float32 => "float32",
            Self::Double64 => "double64",
            Self::Enumeration => "enumeration",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Wire column/parameter type codes (`enum_field_types`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FieldType {
    Decimal = 0,
    Tiny = 1,
    Short = 2,
    Long = 3,
    Float = 4,
    Double = 5,
    Null = 6,
    Timestamp = 7,
    LongLong = 8,
    Int24 = 9,
    Date = 10,
    Time = 11,
    DateTime = 12,
    Year = 13,
    NewDate = 14,
    VarChar = 15,
    Bit = 16,
    Json = 245,
    NewDecimal = 246,
    Enum = 247,
    Set = 248,
    TinyBlob = 249,
    MediumBlob = 250,
    LongBlob = 251,
    Blob = 252,
    VarString = 253,
    String = 254,
    Geometry = 255,
}

impl FieldType {
    /// Decode a wire type code. Unknown codes are treated as strings.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Decimal,
            1 => Self::Tiny,
            2 => Self::Short,
            3 => Self::Long,
            4 => Self::Float,
            5 => Self::Double,
            6 => Self::Null,
            7 => Self::Timestamp,
            8 => Self::LongLong,
            9 => Self::Int24,
            10 => Self::Date,
            11 => Self::Time,
            12 => Self::DateTime,
            13 => Self::Year,
            14 => Self::NewDate,
            15 => Self::VarChar,
            16 => Self::Bit,
            245 => Self::Json,
            246 => Self::NewDecimal,
            247 => Self::Enum,
            248 => Self::Set,
            249 => Self::TinyBlob,
            250 => Self::MediumBlob,
            251 => Self::LongBlob,
            252 => Self::Blob,
            253 => Self::VarString,
            255 => Self::Geometry,
            _ => Self::String,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// The accessor type a column of this wire type reports.
    pub fn value_type(self) -> ValueType {
        match self {
            Self::Null => ValueType::Null,
            Self::Bit => ValueType::Boolean,
            Self::Float => ValueType::Float32,
            Self::Decimal | Self::NewDecimal => ValueType::Decimal,
            Self::Double => ValueType::Double64,
            Self::Date | Self::NewDate => ValueType::Date,
            Self::Time => ValueType::Time,
            Self::Timestamp | Self::DateTime => ValueType::DateTime,
            Self::Tiny => ValueType::Signed8,
            Self::Year | Self::Short => ValueType::Signed16,
            Self::Int24 | Self::Long => ValueType::Signed32,
            Self::LongLong => ValueType::Signed64,
            Self::TinyBlob | Self::MediumBlob | Self::LongBlob | Self::Blob => ValueType::Blob,
            Self::Enum => ValueType::Enumeration,
            Self::VarChar
            | Self::VarString
            | Self::String
            | Self::Json
            | Self::Set
            | Self::Geometry => ValueType::String,
        }
    }

    /// Temporal types travel as [`NativeTime`] in the binary protocol.
    pub fn is_temporal(self) -> bool {
        matches!(
            self,
            Self::Date | Self::NewDate | Self::Time | Self::DateTime | Self::Timestamp
        )
    }

    /// Byte width of fixed-size scalar types, `None` for everything else.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            Self::Null => Some(1),
            Self::Tiny | Self::Bit => Some(1),
            Self::Year | Self::Short => Some(2),
            Self::Int24 | Self::Long => Some(4),
            Self::LongLong => Some(8),
            Self::Float => Some(4),
            Self::Double => Some(8),
            _ => None,
        }
    }
}

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    #[default]
    RepeatableRead,
    ReadCommitted,
    ReadUncommitted,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::RepeatableRead => "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ;",
            Self::ReadCommitted => "SET TRANSACTION ISOLATION LEVEL READ COMMITTED;",
            Self::ReadUncommitted => "SET TRANSACTION ISOLATION LEVEL READ UNCOMMITTED;",
            Self::Serializable => "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE;",
        }
    }
}

/// A dynamically typed cell, as returned by `ResultSet::get_value`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Signed(i64),
    Unsigned(u64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    Date(DateTime),
    DateTime(DateTime),
    Time(Time),
    String(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Signed(n) => write!(f, "{}", n),
            Value::Unsigned(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Double(n) => write!(f, "{}", n),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Date(d) => write!(f, "{}", d.str_date()),
            Value::DateTime(d) => write!(f, "{}", d.str(true)),
            Value::Time(t) => write!(f, "{}", t.str_time(true)),
            Value::String(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_mapping() {
        assert_eq!(FieldType::Tiny.value_type(), ValueType::Signed8);
        assert_eq!(FieldType::Year.value_type(), ValueType::Signed16);
        assert_eq!(FieldType::Int24.value_type(), ValueType::Signed32);
        assert_eq!(FieldType::Timestamp.value_type(), ValueType::DateTime);
        assert_eq!(FieldType::NewDecimal.value_type(), ValueType::Decimal);
        assert_eq!(FieldType::Bit.value_type(), ValueType::Boolean);
        assert_eq!(FieldType::Json.value_type(), ValueType::String);
        assert_eq!(FieldType::MediumBlob.value_type(), ValueType::Blob);
    }

    #[test]
    fn test_field_type_codes() {
        assert_eq!(FieldType::from_code(246), FieldType::NewDecimal);
        assert_eq!(FieldType::from_code(12).code(), 12);
        assert_eq!(FieldType::from_code(100), FieldType::String);
    }

    #[test]
    fn test_fixed_widths() {
        assert_eq!(FieldType::Tiny.fixed_width(), Some(1));
        assert_eq!(FieldType::Year.fixed_width(), Some(2));
        assert_eq!(FieldType::Int24.fixed_width(), Some(4));
        assert_eq!(FieldType::Double.fixed_width(), Some(8));
        assert_eq!(FieldType::VarString.fixed_width(), None);
    }
}
