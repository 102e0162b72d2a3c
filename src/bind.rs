//! Value binding: typed values to and from wire parameter/column buffers.
//!
//! A [`Bind`] carries one parameter or result column: the wire type, an
//! 8-byte scalar slot, a temporal struct and an optional owned byte buffer.
//! Binds live in a [`BindSet`], a fixed-size heap slice that is allocated
//! once per statement or result set and never grows, so every bind keeps a
//! stable address while the statement is alive. `Bind` is not `Clone`.

use crate::error::{MariaError, MariaResult};
use crate::types::{DateTime, Decimal, FieldType, NativeTime, Time, TimeKind};

/// Borrowed view of the storage a bind currently uses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BindBuffer<'a> {
    /// Fixed-width scalar; the raw little-endian bits.
    Scalar(u64),
    Time(&'a NativeTime),
    Bytes(&'a [u8]),
    Empty,
}

#[derive(Debug)]
pub struct Bind {
    field_type: FieldType,
    unsigned: bool,
    scalar: u64,
    time: NativeTime,
    buffer: Option<Box<[u8]>>,
    length: usize,
    is_null: bool,
    truncated: bool,
}

impl Default for Bind {
    fn default() -> Self {
        Self {
            field_type: FieldType::Null,
            unsigned: false,
            scalar: 0,
            time: NativeTime::default(),
            buffer: None,
            length: 0,
            is_null: true,
            truncated: false,
        }
    }
}

impl Bind {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the bind for `field_type` and copy `data` in.
    ///
    /// Fixed-width types store into the scalar slot and record their width.
    /// Temporal types record the size of [`NativeTime`]; use
    /// [`Bind::set_time`] to fill it. Variable-length types get an owned
    /// buffer of exactly `length` bytes, zeroed when `data` is `None` and no
    /// buffer at all when `length` is 0. Data longer than the buffer is cut
    /// and flags the bind as truncated.
    pub fn set(&mut self, field_type: FieldType, data: Option<&[u8]>, length: usize, unsigned: bool) {
        self.field_type = field_type;
        self.unsigned = unsigned;
        self.is_null = field_type == FieldType::Null;
        self.truncated = false;
        self.scalar = 0;

        if let Some(width) = field_type.fixed_width() {
            self.length = width;
            self.buffer = None;
            if let Some(data) = data {
                let mut bytes = [0u8; 8];
                let n = data.len().min(width);
                bytes[..n].copy_from_slice(&data[..n]);
                self.scalar = u64::from_le_bytes(bytes);
                self.truncated = data.len() > width;
            }
            return;
        }

        if field_type.is_temporal() {
            self.length = std::mem::size_of::<NativeTime>();
            self.buffer = None;
            self.time = NativeTime::default();
            return;
        }

        self.length = length;
        if length == 0 {
            self.buffer = None;
            return;
        }
        let mut buffer = match self.buffer.take() {
            Some(mut existing) if existing.len() == length => {
                existing.fill(0);
                existing
            }
            _ => vec![0u8; length].into_boxed_slice(),
        };
        if let Some(data) = data {
            let n = data.len().min(length);
            buffer[..n].copy_from_slice(&data[..n]);
            self.truncated = data.len() > length;
        }
        self.buffer = Some(buffer);
    }

    pub fn set_null(&mut self) {
        self.set(FieldType::Null, None, 0, false);
    }

    pub fn set_signed(&mut self, field_type: FieldType, value: i64) {
        let width = field_type.fixed_width().unwrap_or(8);
        self.set(field_type, Some(&value.to_le_bytes()[..width]), width, false);
    }

    pub fn set_unsigned(&mut self, field_type: FieldType, value: u64) {
        let width = field_type.fixed_width().unwrap_or(8);
        self.set(field_type, Some(&value.to_le_bytes()[..width]), width, true);
    }

    pub fn set_float(&mut self, value: f32) {
        self.set(FieldType::Float, Some(&value.to_le_bytes()), 4, false);
    }

    pub fn set_double(&mut self, value: f64) {
        self.set(FieldType::Double, Some(&value.to_le_bytes()), 8, false);
    }

    pub fn set_bytes(&mut self, field_type: FieldType, data: &[u8]) {
        self.set(field_type, Some(data), data.len(), false);
        // zero-length values are empty, not NULL
        self.is_null = false;
    }

    pub fn set_time(&mut self, field_type: FieldType, time: NativeTime) {
        self.set(field_type, None, 0, false);
        self.time = time;
    }

    /// Flag the current value as NULL without changing the declared type.
    pub fn set_is_null(&mut self, is_null: bool) {
        self.is_null = is_null;
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn is_unsigned(&self) -> bool {
        self.unsigned
    }

    pub fn is_null(&self) -> bool {
        self.is_null
    }

    /// Byte length of the value (fixed width, temporal struct size, or buffer length).
    pub fn length(&self) -> usize {
        self.length
    }

    /// Set when supplied data did not fit the buffer.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn buffer(&self) -> BindBuffer<'_> {
        if self.field_type.fixed_width().is_some() && !self.is_null {
            BindBuffer::Scalar(self.scalar)
        } else if self.field_type.is_temporal() {
            BindBuffer::Time(&self.time)
        } else {
            match &self.buffer {
                Some(b) => BindBuffer::Bytes(b),
                None => BindBuffer::Empty,
            }
        }
    }

    /// Scalar as a signed integer, sign-extended from the wire width.
    pub fn signed(&self) -> i64 {
        match (self.length, self.unsigned) {
            (1, false) => self.scalar as u8 as i8 as i64,
            (2, false) => self.scalar as u16 as i16 as i64,
            (4, false) => self.scalar as u32 as i32 as i64,
            _ => self.scalar as i64,
        }
    }

    /// Scalar as an unsigned integer, zero-extended unless the column is signed.
    pub fn unsigned(&self) -> u64 {
        if self.unsigned {
            self.scalar
        } else {
            self.signed() as u64
        }
    }

    pub fn float(&self) -> f32 {
        f32::from_bits(self.scalar as u32)
    }

    pub fn double(&self) -> f64 {
        f64::from_bits(self.scalar)
    }

    pub fn native_time(&self) -> &NativeTime {
        &self.time
    }

    /// Variable-length contents; empty for scalars and NULL.
    pub fn bytes(&self) -> &[u8] {
        self.buffer.as_deref().unwrap_or(&[])
    }

    /// Raw little-endian scalar bytes trimmed to the wire width.
    pub fn scalar_bytes(&self) -> Vec<u8> {
        self.scalar.to_le_bytes()[..self.length.min(8)].to_vec()
    }
}

/// Fixed-size arena of binds. Never grows after construction.
#[derive(Debug, Default)]
pub struct BindSet {
    binds: Box<[Bind]>,
}

impl BindSet {
    pub fn new(count: usize) -> Self {
        Self {
            binds: (0..count).map(|_| Bind::new()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.binds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.binds.is_empty()
    }

    pub fn get(&self, index: usize) -> MariaResult<&Bind> {
        let count = self.binds.len();
        self.binds
            .get(index)
            .ok_or(MariaError::OutOfRange { index, count })
    }

    pub fn get_mut(&mut self, index: usize) -> MariaResult<&mut Bind> {
        let count = self.binds.len();
        self.binds
            .get_mut(index)
            .ok_or(MariaError::OutOfRange { index, count })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bind> {
        self.binds.iter()
    }
}

// ==================== ToBind ====================

/// Types that can be written into a parameter bind.
pub trait ToBind {
    fn to_bind(&self, bind: &mut Bind);
}

macro_rules! signed_to_bind {
    ($($ty:ty => $field:expr),*) => {
        $(impl ToBind for $ty {
            fn to_bind(&self, bind: &mut Bind) {
                bind.set_signed($field, *self as i64);
            }
        })*
    };
}

macro_rules! unsigned_to_bind {
    ($($ty:ty => $field:expr),*) => {
        $(impl ToBind for $ty {
            fn to_bind(&self, bind: &mut Bind) {
                bind.set_unsigned($field, *self as u64);
            }
        })*
    };
}

signed_to_bind!(i8 => FieldType::Tiny, i16 => FieldType::Short, i32 => FieldType::Long, i64 => FieldType::LongLong);
unsigned_to_bind!(u8 => FieldType::Tiny, u16 => FieldType::Short, u32 => FieldType::Long, u64 => FieldType::LongLong);

impl ToBind for bool {
    fn to_bind(&self, bind: &mut Bind) {
        bind.set_signed(FieldType::Tiny, *self as i64);
    }
}

impl ToBind for f32 {
    fn to_bind(&self, bind: &mut Bind) {
        bind.set_float(*self);
    }
}

impl ToBind for f64 {
    fn to_bind(&self, bind: &mut Bind) {
        bind.set_double(*self);
    }
}

impl ToBind for str {
    fn to_bind(&self, bind: &mut Bind) {
        bind.set_bytes(FieldType::String, self.as_bytes());
    }
}

impl ToBind for String {
    fn to_bind(&self, bind: &mut Bind) {
        self.as_str().to_bind(bind);
    }
}

impl ToBind for [u8] {
    fn to_bind(&self, bind: &mut Bind) {
        bind.set_bytes(FieldType::Blob, self);
    }
}

impl ToBind for Vec<u8> {
    fn to_bind(&self, bind: &mut Bind) {
        self.as_slice().to_bind(bind);
    }
}

impl ToBind for Time {
    fn to_bind(&self, bind: &mut Bind) {
        bind.set_time(FieldType::Time, self.native_time());
    }
}

impl ToBind for DateTime {
    fn to_bind(&self, bind: &mut Bind) {
        let mut native = self.native_time();
        native.kind = TimeKind::DateTime;
        bind.set_time(FieldType::DateTime, native);
    }
}

/// Decimals travel as their string form.
impl ToBind for Decimal {
    fn to_bind(&self, bind: &mut Bind) {
        bind.set_bytes(FieldType::NewDecimal, self.str().as_bytes());
    }
}

impl<T: ToBind + ?Sized> ToBind for &T {
    fn to_bind(&self, bind: &mut Bind) {
        (**self).to_bind(bind);
    }
}

impl<T: ToBind> ToBind for Option<T> {
    fn to_bind(&self, bind: &mut Bind) {
        match self {
            Some(value) => value.to_bind(bind),
            None => bind.set_null(),
        }
    }
}
