//! Buffered query results with typed, coercion-checked accessors.
//!
//! A [`ResultSet`] comes either from a text query (cells are the server's
//! string form) or from a prepared statement (cells are decoded from binary
//! row packets into a [`BindSet`] as the cursor moves). Accessors take a
//! column by 0-based index or by case-sensitive name.

use std::collections::HashMap;
use std::io::Cursor;
use std::str::FromStr;

use crate::bind::{Bind, BindSet};
use crate::client::TextRows;
use crate::coercion;
use crate::error::{MariaError, MariaResult};
use crate::protocol::{binary, ColumnDef};
use crate::types::{DateTime, Decimal, FieldType, Time, Value, ValueType};

enum Rows {
    Text(Vec<Vec<Option<Vec<u8>>>>),
    Binary {
        packets: Vec<Vec<u8>>,
        binds: BindSet,
    },
}

impl Rows {
    fn len(&self) -> usize {
        match self {
            Rows::Text(rows) => rows.len(),
            Rows::Binary { packets, .. } => packets.len(),
        }
    }
}

/// One cell of the current row.
#[derive(Clone, Copy)]
enum Cell<'a> {
    Null,
    Text(&'a [u8]),
    Bind(&'a Bind),
}

impl<'a> Cell<'a> {
    fn bytes(self) -> &'a [u8] {
        match self {
            Cell::Null => &[],
            Cell::Text(b) => b,
            Cell::Bind(b) => b.bytes(),
        }
    }
}

/// Column lookup by position or by name.
pub trait ColumnIndex {
    fn column_in(&self, rs: &ResultSet) -> MariaResult<usize>;
}

impl ColumnIndex for usize {
    fn column_in(&self, rs: &ResultSet) -> MariaResult<usize> {
        if *self < rs.columns.len() {
            Ok(*self)
        } else {
            Err(MariaError::OutOfRange {
                index: *self,
                count: rs.columns.len(),
            })
        }
    }
}

impl ColumnIndex for &str {
    fn column_in(&self, rs: &ResultSet) -> MariaResult<usize> {
        rs.index
            .get(*self)
            .copied()
            .ok_or_else(|| MariaError::UnknownColumn(self.to_string()))
    }
}

impl ColumnIndex for &String {
    fn column_in(&self, rs: &ResultSet) -> MariaResult<usize> {
        self.as_str().column_in(rs)
    }
}

pub struct ResultSet {
    columns: Vec<ColumnDef>,
    index: HashMap<String, usize>,
    rows: Rows,
    position: Option<usize>,
}

impl std::fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("columns", &self.columns.len())
            .field("rows", &self.rows.len())
            .field("position", &self.position)
            .finish()
    }
}

impl ResultSet {
    /// A result with no columns and no rows.
    pub fn empty() -> Self {
        Self::new(Vec::new(), Rows::Text(Vec::new()))
    }

    pub(crate) fn from_text(text: TextRows) -> Self {
        Self::new(text.columns, Rows::Text(text.rows))
    }

    pub(crate) fn from_binary(columns: Vec<ColumnDef>, packets: Vec<Vec<u8>>) -> Self {
        let binds = BindSet::new(columns.len());
        Self::new(columns, Rows::Binary { packets, binds })
    }

    fn new(columns: Vec<ColumnDef>, rows: Rows) -> Self {
        let index = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        Self {
            columns,
            index,
            rows,
            position: None,
        }
    }

    // ==================== Cursor ====================

    /// Advance to the next row. Returns false once past the last row.
    pub fn next(&mut self) -> MariaResult<bool> {
        let next = self.position.map_or(0, |p| p + 1);
        if next >= self.rows.len() {
            self.position = Some(self.rows.len());
            return Ok(false);
        }
        self.load(next)?;
        Ok(true)
    }

    /// Seek to `row` and fetch it.
    pub fn set_row_index(&mut self, row: usize) -> MariaResult<bool> {
        if row >= self.rows.len() {
            return Err(MariaError::OutOfRange {
                index: row,
                count: self.rows.len(),
            });
        }
        self.load(row)?;
        Ok(true)
    }

    fn load(&mut self, row: usize) -> MariaResult<()> {
        if let Rows::Binary { packets, binds } = &mut self.rows {
            binary::decode_row(&packets[row], &self.columns, binds)?;
        }
        self.position = Some(row);
        Ok(())
    }

    /// Current row, `None` before the first `next()` and after the last.
    pub fn row_index(&self) -> Option<usize> {
        self.position.filter(|&p| p < self.rows.len())
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column_type(&self, column: impl ColumnIndex) -> MariaResult<ValueType> {
        let i = column.column_in(self)?;
        Ok(self.columns[i].value_type())
    }

    pub fn column_name(&self, column: usize) -> MariaResult<&str> {
        let i = column.column_in(self)?;
        Ok(&self.columns[i].name)
    }

    pub fn column_index(&self, name: &str) -> MariaResult<usize> {
        name.column_in(self)
    }

    // ==================== Cells ====================

    fn cell(&self, i: usize) -> MariaResult<Cell<'_>> {
        let row = self.row_index().ok_or(MariaError::NoRow)?;
        Ok(match &self.rows {
            Rows::Text(rows) => match &rows[row][i] {
                Some(bytes) => Cell::Text(bytes),
                None => Cell::Null,
            },
            Rows::Binary { binds, .. } => {
                let bind = binds.get(i)?;
                if bind.is_null() {
                    Cell::Null
                } else {
                    Cell::Bind(bind)
                }
            }
        })
    }

    /// Resolve the column, check coercion and fetch the cell.
    fn typed(&self, column: impl ColumnIndex, requested: ValueType) -> MariaResult<(usize, Cell<'_>)> {
        let i = column.column_in(self)?;
        coercion::check(requested, self.columns[i].value_type())?;
        Ok((i, self.cell(i)?))
    }

    fn integer(&self, column: impl ColumnIndex, requested: ValueType) -> MariaResult<i128> {
        match self.typed(column, requested)? {
            (i, Cell::Null) => Err(MariaError::UnexpectedNull(i)),
            (_, Cell::Text(bytes)) => parse_text(bytes, "integer"),
            (_, Cell::Bind(bind)) if bind.is_unsigned() => Ok(bind.unsigned() as i128),
            (_, Cell::Bind(bind)) => Ok(bind.signed() as i128),
        }
    }

    /// Integer narrowed to the accessor's width; values that do not fit are
    /// a `Format` error rather than wrapping.
    fn sized<T: TryFrom<i128>>(
        &self,
        column: impl ColumnIndex,
        requested: ValueType,
        what: &'static str,
    ) -> MariaResult<T> {
        let value = self.integer(column, requested)?;
        T::try_from(value).map_err(|_| MariaError::format(what, value.to_string()))
    }

    pub fn is_null(&self, column: impl ColumnIndex) -> MariaResult<bool> {
        let i = column.column_in(self)?;
        Ok(matches!(self.cell(i)?, Cell::Null))
    }

    /// Raw bytes as a reader. NULL reads as empty.
    pub fn get_blob(&self, column: impl ColumnIndex) -> MariaResult<Cursor<&[u8]>> {
        let (_, cell) = self.typed(column, ValueType::Blob)?;
        Ok(Cursor::new(cell.bytes()))
    }

    pub fn get_data(&self, column: impl ColumnIndex) -> MariaResult<Vec<u8>> {
        let (_, cell) = self.typed(column, ValueType::Data)?;
        Ok(cell.bytes().to_vec())
    }

    /// NULL reads as an empty string.
    pub fn get_string(&self, column: impl ColumnIndex) -> MariaResult<String> {
        let (_, cell) = self.typed(column, ValueType::String)?;
        Ok(String::from_utf8_lossy(cell.bytes()).into_owned())
    }

    pub fn get_decimal(&self, column: impl ColumnIndex) -> MariaResult<Decimal> {
        match self.typed(column, ValueType::Decimal)? {
            (i, Cell::Null) => Err(MariaError::UnexpectedNull(i)),
            (_, cell) => String::from_utf8_lossy(cell.bytes()).trim().parse(),
        }
    }

    fn temporal(&self, column: impl ColumnIndex, requested: ValueType) -> MariaResult<DateTime> {
        match self.typed(column, requested)? {
            (i, Cell::Null) => Err(MariaError::UnexpectedNull(i)),
            (_, Cell::Bind(bind)) => DateTime::from_native(bind.native_time()),
            (_, Cell::Text(bytes)) => server_fraction(&String::from_utf8_lossy(bytes)).parse(),
        }
    }

    pub fn get_date(&self, column: impl ColumnIndex) -> MariaResult<DateTime> {
        Ok(self.temporal(column, ValueType::Date)?.date())
    }

    pub fn get_date_time(&self, column: impl ColumnIndex) -> MariaResult<DateTime> {
        self.temporal(column, ValueType::DateTime)
    }

    pub fn get_time(&self, column: impl ColumnIndex) -> MariaResult<Time> {
        match self.typed(column, ValueType::Time)? {
            (i, Cell::Null) => Err(MariaError::UnexpectedNull(i)),
            (_, Cell::Bind(bind)) => Time::from_native(bind.native_time()),
            (_, Cell::Text(bytes)) => server_fraction(&String::from_utf8_lossy(bytes)).parse(),
        }
    }

    /// BIT(1) or TINYINT; any non-zero value is true.
    pub fn get_boolean(&self, column: impl ColumnIndex) -> MariaResult<bool> {
        match self.typed(column, ValueType::Boolean)? {
            (i, Cell::Null) => Err(MariaError::UnexpectedNull(i)),
            (_, Cell::Bind(bind)) => Ok(bind.unsigned() != 0),
            (i, Cell::Text(bytes)) if self.columns[i].field_type == FieldType::Bit => {
                Ok(bytes.iter().any(|&b| b != 0))
            }
            (_, Cell::Text(bytes)) => Ok(parse_text::<i64>(bytes, "boolean")? != 0),
        }
    }

    pub fn get_unsigned8(&self, column: impl ColumnIndex) -> MariaResult<u8> {
        self.sized(column, ValueType::Unsigned8, "unsigned8")
    }

    pub fn get_signed8(&self, column: impl ColumnIndex) -> MariaResult<i8> {
        self.sized(column, ValueType::Signed8, "signed8")
    }

    pub fn get_unsigned16(&self, column: impl ColumnIndex) -> MariaResult<u16> {
        self.sized(column, ValueType::Unsigned16, "unsigned16")
    }

    pub fn get_signed16(&self, column: impl ColumnIndex) -> MariaResult<i16> {
        self.sized(column, ValueType::Signed16, "signed16")
    }

    pub fn get_unsigned32(&self, column: impl ColumnIndex) -> MariaResult<u32> {
        self.sized(column, ValueType::Unsigned32, "unsigned32")
    }

    pub fn get_signed32(&self, column: impl ColumnIndex) -> MariaResult<i32> {
        self.sized(column, ValueType::Signed32, "signed32")
    }

    pub fn get_unsigned64(&self, column: impl ColumnIndex) -> MariaResult<u64> {
        self.sized(column, ValueType::Unsigned64, "unsigned64")
    }

    pub fn get_signed64(&self, column: impl ColumnIndex) -> MariaResult<i64> {
        self.sized(column, ValueType::Signed64, "signed64")
    }

    pub fn get_float(&self, column: impl ColumnIndex) -> MariaResult<f32> {
        match self.typed(column, ValueType::Float32)? {
            (i, Cell::Null) => Err(MariaError::UnexpectedNull(i)),
            (_, Cell::Bind(bind)) => Ok(bind.float()),
            (_, Cell::Text(bytes)) => parse_text(bytes, "float"),
        }
    }

    pub fn get_double(&self, column: impl ColumnIndex) -> MariaResult<f64> {
        match self.typed(column, ValueType::Double64)? {
            (i, Cell::Null) => Err(MariaError::UnexpectedNull(i)),
            (_, Cell::Bind(bind)) => Ok(bind.double()),
            (_, Cell::Text(bytes)) => parse_text(bytes, "double"),
        }
    }

    /// Decode the cell by the column's own type, skipping coercion checks.
    ///
    /// Temporal and decimal cells that do not parse (zero dates, TIME values
    /// past 24 hours) come back as strings.
    pub fn get_value(&self, column: impl ColumnIndex) -> MariaResult<Value> {
        let i = column.column_in(self)?;
        let cell = self.cell(i)?;
        if let Cell::Null = cell {
            return Ok(Value::Null);
        }
        let col = &self.columns[i];
        let actual = col.value_type();
        let text = || String::from_utf8_lossy(cell.bytes()).into_owned();

        Ok(match actual {
            ValueType::Null | ValueType::Blob | ValueType::Data => Value::Bytes(cell.bytes().to_vec()),
            ValueType::String | ValueType::Enumeration => Value::String(text()),
            ValueType::Boolean => Value::Bool(self.get_boolean(i)?),
            ValueType::Float32 => Value::Float(self.get_float(i)?),
            ValueType::Double64 => Value::Double(self.get_double(i)?),
            ValueType::Unsigned8
            | ValueType::Unsigned16
            | ValueType::Unsigned32
            | ValueType::Unsigned64 => Value::Unsigned(self.integer(i, actual)? as u64),
            ValueType::Signed8 | ValueType::Signed16 | ValueType::Signed32 | ValueType::Signed64 => {
                Value::Signed(self.integer(i, actual)? as i64)
            }
            ValueType::Decimal => self
                .get_decimal(i)
                .map(Value::Decimal)
                .unwrap_or_else(|_| Value::String(text())),
            ValueType::Date => self
                .get_date(i)
                .map(Value::Date)
                .unwrap_or_else(|_| Value::String(text())),
            ValueType::DateTime => self
                .get_date_time(i)
                .map(Value::DateTime)
                .unwrap_or_else(|_| Value::String(text())),
            ValueType::Time => self
                .get_time(i)
                .map(Value::Time)
                .unwrap_or_else(|_| Value::String(text())),
        })
    }
}

fn parse_text<T: FromStr>(bytes: &[u8], what: &'static str) -> MariaResult<T> {
    let text = String::from_utf8_lossy(bytes);
    text.trim()
        .parse()
        .map_err(|_| MariaError::format(what, text.into_owned()))
}

/// The server sends 0 to 6 fraction digits; keep exactly three (milliseconds).
fn server_fraction(text: &str) -> String {
    match text.rsplit_once('.') {
        Some((head, frac))
            if head.contains(':') && !frac.is_empty() && frac.bytes().all(|b| b.is_ascii_digit()) =>
        {
            format!("{}.{:0<3}", head, &frac[..frac.len().min(3)])
        }
        _ => text.to_string(),
    }
}
