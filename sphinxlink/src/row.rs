//! Result row operation.
//!
//! - [`RowShape`]
//! - [`Row`]
//! - [`RowSet`]
//! - [`Column`]
//! - [`FromRow`]
//! - [`Decode`]
//!
//! - [`Index`]
//! - [`DecodeError`]
use bytes::Bytes;
use std::{borrow::Cow, fmt, str::Utf8Error, string::FromUtf8Error, sync::Arc};

use crate::{common::ByteStr, ext::FmtExt};

/// Declared type of a result field.
///
/// Text from the server is parsed into the declared type when a row is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Any text, kept as bytes in the host encoding.
    Text,
    /// 32 bit integer.
    Int,
    /// 64 bit integer.
    BigInt,
    /// Double precision float.
    Float,
    /// Boolean, accepts `1`/`0`, `t`/`f`, `true`/`false`, `yes`/`no`, `on`/`off`.
    Bool,
    /// Unix timestamp in seconds, as `searchd` sends `timestamp` attributes.
    Timestamp,
    /// Json text, kept as bytes.
    Json,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Int => "int",
            FieldType::BigInt => "bigint",
            FieldType::Float => "float",
            FieldType::Bool => "bool",
            FieldType::Timestamp => "timestamp",
            FieldType::Json => "json",
        }
    }

    /// Parse field text into a [`Value`].
    pub fn parse(&self, text: &[u8]) -> Result<Value, DecodeError> {
        let invalid = || DecodeError::Parse { ty: *self, value: text.lossy().to_string() };

        match self {
            FieldType::Text | FieldType::Json => Ok(Value::Text(Bytes::copy_from_slice(text))),
            FieldType::Int => {
                let int: i32 = parse_ascii(text).ok_or_else(invalid)?;
                Ok(Value::Int(int.into()))
            },
            FieldType::BigInt | FieldType::Timestamp => {
                parse_ascii(text).map(Value::Int).ok_or_else(invalid)
            },
            FieldType::Float => parse_ascii(text).map(Value::Float).ok_or_else(invalid),
            FieldType::Bool => {
                let text = std::str::from_utf8(text).map_err(|_| invalid())?.trim();
                match text.to_ascii_lowercase().as_str() {
                    "1" | "t" | "true" | "y" | "yes" | "on" => Ok(Value::Bool(true)),
                    "0" | "f" | "false" | "n" | "no" | "off" => Ok(Value::Bool(false)),
                    _ => Err(invalid()),
                }
            },
        }
    }
}

fn parse_ascii<T: std::str::FromStr>(text: &[u8]) -> Option<T> {
    std::str::from_utf8(text).ok()?.trim().parse().ok()
}

/// The expected layout of every row of a result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowShape {
    fields: Vec<FieldType>,
}

impl RowShape {
    pub fn new(fields: impl Into<Vec<FieldType>>) -> Self {
        Self { fields: fields.into() }
    }

    /// Shape of `len` text fields.
    pub fn text(len: usize) -> Self {
        Self { fields: vec![FieldType::Text; len] }
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[FieldType] {
        &self.fields
    }
}

impl<const N: usize> From<[FieldType; N]> for RowShape {
    fn from(fields: [FieldType; N]) -> Self {
        Self { fields: fields.into() }
    }
}

impl FromIterator<FieldType> for RowShape {
    fn from_iter<T: IntoIterator<Item = FieldType>>(iter: T) -> Self {
        Self { fields: iter.into_iter().collect() }
    }
}

/// A typed field value.
#[derive(Clone, PartialEq)]
pub enum Value {
    Null,
    Text(Bytes),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Value {
    /// Return `true` if value is NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "text",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Text(text) => fmt::Display::fmt(&text.lossy(), f),
            Value::Int(int) => f.write_str(itoa::Buffer::new().format(*int)),
            Value::Float(float) => fmt::Display::fmt(float, f),
            Value::Bool(true) => f.write_str("t"),
            Value::Bool(false) => f.write_str("f"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(text) => fmt::Debug::fmt(&text.lossy(), f),
            _ => fmt::Display::fmt(self, f),
        }
    }
}

/// A row of a result set.
#[derive(Clone, PartialEq)]
pub struct Row {
    columns: Arc<[ByteStr]>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(columns: Arc<[ByteStr]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Returns `true` if row contains no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the number of fields/column.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Column names, as sent by the server.
    pub fn columns(&self) -> &[ByteStr] {
        &self.columns
    }

    /// Returns the value at `idx`.
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Try get and decode column.
    pub fn try_get<I: Index, R: Decode>(&self, idx: I) -> Result<R, DecodeError> {
        let nth = idx.position(&self.columns[..self.values.len().min(self.columns.len())])?;
        R::decode(Column {
            name: self.columns[nth].clone(),
            value: self.values[nth].clone(),
        })
    }

    /// Try decode type using [`FromRow`] implementation.
    pub fn decode<D: FromRow>(self) -> Result<D, DecodeError> {
        D::from_row(self)
    }
}

impl IntoIterator for Row {
    type Item = Column;

    type IntoIter = IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            columns: self.columns,
            values: self.values.into_iter(),
            iter_n: 0,
        }
    }
}

/// [`IntoIterator`] implementation from [`Row`].
#[derive(Debug)]
pub struct IntoIter {
    columns: Arc<[ByteStr]>,
    values: std::vec::IntoIter<Value>,
    iter_n: usize,
}

impl IntoIter {
    /// Same as [`Iterator::next`] but returns [`Result`] instead.
    pub fn try_next(&mut self) -> Result<Column, DecodeError> {
        match self.next() {
            Some(ok) => Ok(ok),
            None => Err(DecodeError::IndexOutOfBounds(self.iter_n)),
        }
    }
}

impl Iterator for IntoIter {
    type Item = Column;

    fn next(&mut self) -> Option<Self::Item> {
        let value = self.values.next()?;
        let name = self.columns.get(self.iter_n).cloned().unwrap_or_default();
        self.iter_n += 1;
        Some(Column { name, value })
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_map();
        for (i, value) in self.values.iter().enumerate() {
            match self.columns.get(i) {
                Some(name) => dbg.key(name),
                None => dbg.key(&i),
            };
            dbg.value(value);
        }
        dbg.finish()
    }
}

/// Materialized rows of a query.
///
/// Every row has exactly as many fields as the [`RowShape`] it was built with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    columns: Arc<[ByteStr]>,
    rows: Vec<Row>,
}

impl RowSet {
    pub(crate) fn new(columns: Arc<[ByteStr]>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    pub(crate) fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Column names, empty when the result had no column.
    pub fn columns(&self) -> &[ByteStr] {
        &self.columns
    }

    pub(crate) fn columns_arc(&self) -> &Arc<[ByteStr]> {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Row> {
        self.rows.get(idx)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Decode every row using [`FromRow`] implementation.
    pub fn decode<D: FromRow>(self) -> Result<Vec<D>, DecodeError> {
        self.rows.into_iter().map(FromRow::from_row).collect()
    }
}

impl IntoIterator for RowSet {
    type Item = Row;

    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a RowSet {
    type Item = &'a Row;

    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// A named field of a row.
#[derive(Debug, Clone)]
pub struct Column {
    name: ByteStr,
    value: Value,
}

impl Column {
    /// Returns column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return `true` if value is NULL.
    pub const fn is_null(&self) -> bool {
        self.value.is_null()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Try consume self into the inner text.
    ///
    /// Return [`DecodeError::Null`] if value is `NULL`.
    pub fn try_into_text(self) -> Result<Bytes, DecodeError> {
        match self.value {
            Value::Text(text) => Ok(text),
            Value::Null => Err(DecodeError::Null),
            value => Err(DecodeError::mismatch("text", &value)),
        }
    }

    /// Try decode type using [`Decode`] implementation.
    pub fn decode<D: Decode>(self) -> Result<D, DecodeError> {
        D::decode(self)
    }
}

// ===== Traits =====

/// Type that can be constructed from a row.
pub trait FromRow: Sized {
    /// Construct self from row.
    fn from_row(row: Row) -> Result<Self, DecodeError>;
}

impl FromRow for Row {
    fn from_row(row: Row) -> Result<Self, DecodeError> {
        Ok(row)
    }
}

impl FromRow for () {
    fn from_row(_: Row) -> Result<Self, DecodeError> {
        Ok(())
    }
}

macro_rules! from_row_tuple {
    ($($t:ident $i:literal),*) => {
        impl<$($t),*> FromRow for ($($t),*,)
        where
            $($t: Decode),*
        {
            fn from_row(row: Row) -> Result<Self, DecodeError> {
                Ok((
                    $(row.try_get($i)?),*,
                ))
            }
        }
    };
}

from_row_tuple!(T0 0);
from_row_tuple!(T0 0, T1 1);
from_row_tuple!(T0 0, T1 1, T2 2);
from_row_tuple!(T0 0, T1 1, T2 2, T3 3);
from_row_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4);
from_row_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4, T5 5);

/// A type that can be constructed from [`Column`].
pub trait Decode: Sized {
    /// Try decode self from column.
    fn decode(column: Column) -> Result<Self, DecodeError>;
}

impl Decode for Column {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        Ok(column)
    }
}

impl Decode for Value {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        Ok(column.value)
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        match column.is_null() {
            true => Ok(None),
            false => column.decode().map(Some),
        }
    }
}

impl Decode for () {
    fn decode(_: Column) -> Result<Self, DecodeError> {
        Ok(())
    }
}

macro_rules! decode_int {
    ($($ty:ty),*) => {$(
        impl Decode for $ty {
            fn decode(col: Column) -> Result<Self, DecodeError> {
                match col.value {
                    Value::Int(int) => <$ty>::try_from(int).map_err(|_| DecodeError::OutOfRange(int)),
                    Value::Null => Err(DecodeError::Null),
                    value => Err(DecodeError::mismatch(stringify!($ty), &value)),
                }
            }
        }
    )*};
}

decode_int!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl Decode for f64 {
    fn decode(col: Column) -> Result<Self, DecodeError> {
        match col.value {
            Value::Float(float) => Ok(float),
            Value::Int(int) => Ok(int as f64),
            Value::Null => Err(DecodeError::Null),
            value => Err(DecodeError::mismatch("f64", &value)),
        }
    }
}

impl Decode for f32 {
    fn decode(col: Column) -> Result<Self, DecodeError> {
        f64::decode(col).map(|e| e as f32)
    }
}

impl Decode for bool {
    fn decode(col: Column) -> Result<Self, DecodeError> {
        match col.value {
            Value::Bool(b) => Ok(b),
            Value::Null => Err(DecodeError::Null),
            value => Err(DecodeError::mismatch("bool", &value)),
        }
    }
}

impl Decode for Bytes {
    fn decode(col: Column) -> Result<Self, DecodeError> {
        col.try_into_text()
    }
}

impl Decode for Vec<u8> {
    fn decode(col: Column) -> Result<Self, DecodeError> {
        col.try_into_text().map(Into::into)
    }
}

impl Decode for ByteStr {
    fn decode(col: Column) -> Result<Self, DecodeError> {
        Ok(ByteStr::from_utf8(col.try_into_text()?)?)
    }
}

impl Decode for String {
    fn decode(col: Column) -> Result<Self, DecodeError> {
        Ok(String::from_utf8(col.try_into_text().map(Into::into)?)?)
    }
}

/// Type that can be used for indexing column.
pub trait Index: Sized + sealed::Sealed {
    /// Returns the nth column.
    fn position(self, columns: &[ByteStr]) -> Result<usize, DecodeError>;
}

impl Index for usize {
    fn position(self, columns: &[ByteStr]) -> Result<usize, DecodeError> {
        match self < columns.len() {
            true => Ok(self),
            false => Err(DecodeError::IndexOutOfBounds(self)),
        }
    }
}

impl Index for &str {
    fn position(self, columns: &[ByteStr]) -> Result<usize, DecodeError> {
        columns
            .iter()
            .position(|e| e == self)
            .ok_or_else(|| DecodeError::ColumnNotFound(String::from(self).into()))
    }
}

mod sealed {
    pub trait Sealed { }
    impl Sealed for usize { }
    impl Sealed for &str { }
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for DecodeError {
            fn from($pat: $ty) -> Self {
                $body
            }
        }
    };
}

/// An error when decoding row value.
pub enum DecodeError {
    /// Text is not valid utf8.
    Utf8(Utf8Error),
    /// Column requested not found.
    ColumnNotFound(Cow<'static,str>),
    /// Index requested is out of bounds.
    IndexOutOfBounds(usize),
    /// Field text is not valid for its declared type.
    Parse { ty: FieldType, value: String },
    /// Value type does not match the requested type.
    TypeMismatch { expected: &'static str, found: &'static str },
    /// Integer does not fit the requested type.
    OutOfRange(i64),
    /// Row is null.
    Null,
    /// Failed to deserialize using `serde_json`.
    #[cfg(feature = "json")]
    Json(serde_json::error::Error),
}

impl DecodeError {
    pub(crate) fn mismatch(expected: &'static str, found: &Value) -> Self {
        Self::TypeMismatch { expected, found: found.type_name() }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("failed to decode value, ")?;
        match self {
            Self::Utf8(e) => write!(f, "{e}"),
            Self::ColumnNotFound(name) => write!(f, "column not found: {name:?}"),
            Self::IndexOutOfBounds(u) => write!(f, "index out of bounds: {u:?}"),
            Self::Parse { ty, value } => {
                write!(f, "invalid input syntax for type {}: {value:?}", ty.name())
            },
            Self::TypeMismatch { expected, found } => {
                write!(f, "data type missmatch, expected {expected} found {found}")
            },
            Self::OutOfRange(int) => write!(f, "value {int} is out of range"),
            Self::Null => write!(f, "unexpected NULL value"),
            #[cfg(feature = "json")]
            Self::Json(e) => write!(f, "{e}"),
        }
    }
}

from!(<Utf8Error>e => Self::Utf8(e));
from!(<FromUtf8Error>e => Self::Utf8(e.utf8_error()));
#[cfg(feature = "json")]
from!(<serde_json::error::Error>e => Self::Json(e));

impl std::error::Error for DecodeError { }

impl fmt::Debug for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn row() -> Row {
        let columns: Arc<[ByteStr]> = vec!["id".into(), "title".into(), "weight".into()].into();
        Row::new(columns, vec![
            Value::Int(42),
            Value::Text(Bytes::from_static(b"hello")),
            Value::Null,
        ])
    }

    #[test]
    fn parse_field_types() {
        assert_eq!(FieldType::Int.parse(b"17").unwrap(), Value::Int(17));
        assert_eq!(FieldType::BigInt.parse(b"8589934592").unwrap(), Value::Int(8589934592));
        assert_eq!(FieldType::Float.parse(b"1.5").unwrap(), Value::Float(1.5));
        assert_eq!(FieldType::Bool.parse(b"1").unwrap(), Value::Bool(true));
        assert_eq!(FieldType::Bool.parse(b"off").unwrap(), Value::Bool(false));
        assert_eq!(FieldType::Timestamp.parse(b"1700000000").unwrap(), Value::Int(1700000000));
        assert_eq!(
            FieldType::Text.parse(b"caf\xe9").unwrap(),
            Value::Text(Bytes::from_static(b"caf\xe9"))
        );
    }

    #[test]
    fn parse_rejects_invalid_input() {
        assert!(matches!(FieldType::Int.parse(b"abc"), Err(DecodeError::Parse { ty: FieldType::Int, .. })));
        assert!(FieldType::Int.parse(b"8589934592").is_err());
        assert!(FieldType::Bool.parse(b"maybe").is_err());
    }

    #[test]
    fn get_by_index_and_name() {
        let row = row();
        assert_eq!(row.try_get::<_, i32>(0).unwrap(), 42);
        assert_eq!(row.try_get::<_, String>("title").unwrap(), "hello");
        assert_eq!(row.try_get::<_, Option<f64>>("weight").unwrap(), None);
        assert!(matches!(row.try_get::<_, f64>("weight"), Err(DecodeError::Null)));
        assert!(matches!(row.try_get::<_, i32>(3), Err(DecodeError::IndexOutOfBounds(3))));
        assert!(matches!(row.try_get::<_, i32>("missing"), Err(DecodeError::ColumnNotFound(_))));
        assert!(matches!(row.try_get::<_, bool>(1), Err(DecodeError::TypeMismatch { .. })));
    }

    #[test]
    fn decode_tuple() {
        let (id, title, weight) = row().decode::<(u64, String, Option<f64>)>().unwrap();
        assert_eq!(id, 42);
        assert_eq!(title, "hello");
        assert_eq!(weight, None);
    }

    #[test]
    fn iterate_columns() {
        let names: Vec<String> = row().into_iter().map(|c| c.name().to_owned()).collect();
        assert_eq!(names, ["id", "title", "weight"]);
    }
}
