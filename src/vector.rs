//! Columnar output vectors.
//!
//! Column storage is a tagged variant per target type rather than a
//! trait-object hierarchy; the decoder dispatches on the variant and appends
//! directly into the typed buffer.
use uuid::Uuid;

use crate::types::TargetType;

/// An interval value decoded from the 16-byte wire layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Interval {
    pub months: i32,
    pub days: i32,
    pub micros: i64,
}

/// Offset and length of one list row within the child vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListEntry {
    pub offset: u64,
    pub length: u64,
}

/// Typed column storage.
///
/// Temporal columns hold plain integers: dates are days since the Unix
/// epoch, times microseconds since midnight, timestamps microseconds since
/// the Unix epoch.
#[derive(Debug)]
pub enum ColumnData {
    Bool(Vec<bool>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    UInt32(Vec<u32>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    /// Decimal columns store the scaled integer in the narrowest width the
    /// mapped precision fits.
    Decimal16(Vec<i16>),
    Decimal32(Vec<i32>),
    Decimal64(Vec<i64>),
    Decimal128(Vec<i128>),
    Text(Vec<String>),
    Blob(Vec<Vec<u8>>),
    Date(Vec<i32>),
    Time(Vec<i64>),
    TimeTz(Vec<i64>),
    Timestamp(Vec<i64>),
    TimestampTz(Vec<i64>),
    Interval(Vec<Interval>),
    Uuid(Vec<Uuid>),
    Enum(Vec<u32>),
    List {
        entries: Vec<ListEntry>,
        child: Box<ColumnVector>,
    },
}

/// One column of a [`DataChunk`], values plus a validity mask.
#[derive(Debug)]
pub struct ColumnVector {
    pub data: ColumnData,
    /// `false` marks a NULL row; the data buffer holds a placeholder there.
    pub validity: Vec<bool>,
}

impl ColumnVector {
    pub fn new(ty: &TargetType) -> ColumnVector {
        let data = match ty {
            TargetType::Bool => ColumnData::Bool(vec![]),
            TargetType::Int16 => ColumnData::Int16(vec![]),
            TargetType::Int32 => ColumnData::Int32(vec![]),
            TargetType::Int64 => ColumnData::Int64(vec![]),
            TargetType::UInt32 => ColumnData::UInt32(vec![]),
            TargetType::Float32 => ColumnData::Float32(vec![]),
            TargetType::Float64 => ColumnData::Float64(vec![]),
            TargetType::Decimal { width, .. } => match width {
                0..=4 => ColumnData::Decimal16(vec![]),
                5..=9 => ColumnData::Decimal32(vec![]),
                10..=18 => ColumnData::Decimal64(vec![]),
                _ => ColumnData::Decimal128(vec![]),
            },
            // invalid types are cast to text server-side
            TargetType::Text | TargetType::Invalid => ColumnData::Text(vec![]),
            TargetType::Blob => ColumnData::Blob(vec![]),
            TargetType::Date => ColumnData::Date(vec![]),
            TargetType::Time => ColumnData::Time(vec![]),
            TargetType::TimeTz => ColumnData::TimeTz(vec![]),
            TargetType::Timestamp => ColumnData::Timestamp(vec![]),
            TargetType::TimestampTz => ColumnData::TimestampTz(vec![]),
            TargetType::Interval => ColumnData::Interval(vec![]),
            TargetType::Uuid => ColumnData::Uuid(vec![]),
            TargetType::Enum(_) => ColumnData::Enum(vec![]),
            TargetType::List(inner) => ColumnData::List {
                entries: vec![],
                child: Box::new(ColumnVector::new(inner)),
            },
        };
        ColumnVector { data, validity: vec![] }
    }

    /// Number of rows in the vector.
    pub fn len(&self) -> usize {
        self.validity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validity.is_empty()
    }

    /// Returns whether the row at `idx` is non-NULL.
    pub fn is_valid(&self, idx: usize) -> bool {
        self.validity[idx]
    }

    /// Append a NULL row; the data buffer gets a placeholder value.
    pub fn push_null(&mut self) {
        match &mut self.data {
            ColumnData::Bool(v) => v.push(false),
            ColumnData::Int16(v) | ColumnData::Decimal16(v) => v.push(0),
            ColumnData::Int32(v)
            | ColumnData::Decimal32(v)
            | ColumnData::Date(v) => v.push(0),
            ColumnData::Int64(v)
            | ColumnData::Decimal64(v)
            | ColumnData::Time(v)
            | ColumnData::TimeTz(v)
            | ColumnData::Timestamp(v)
            | ColumnData::TimestampTz(v) => v.push(0),
            ColumnData::UInt32(v) | ColumnData::Enum(v) => v.push(0),
            ColumnData::Float32(v) => v.push(0.0),
            ColumnData::Float64(v) => v.push(0.0),
            ColumnData::Decimal128(v) => v.push(0),
            ColumnData::Text(v) => v.push(String::new()),
            ColumnData::Blob(v) => v.push(vec![]),
            ColumnData::Interval(v) => v.push(Interval::default()),
            ColumnData::Uuid(v) => v.push(Uuid::nil()),
            ColumnData::List { entries, child } => {
                entries.push(ListEntry { offset: child.len() as u64, length: 0 });
            }
        }
        self.validity.push(false);
    }
}

/// A batch of decoded rows, one [`ColumnVector`] per projected column.
#[derive(Debug)]
pub struct DataChunk {
    pub columns: Vec<ColumnVector>,
    rows: usize,
    capacity: usize,
}

impl DataChunk {
    pub fn new(types: &[TargetType], capacity: usize) -> DataChunk {
        DataChunk {
            columns: types.iter().map(ColumnVector::new).collect(),
            rows: 0,
            capacity,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn is_full(&self) -> bool {
        self.rows >= self.capacity
    }

    /// Commit one decoded row; every column must have been appended to.
    pub(crate) fn advance_row(&mut self) {
        self.rows += 1;
        debug_assert!(self.columns.iter().all(|c| c.len() == self.rows));
    }
}
