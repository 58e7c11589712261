//! Text-format result rows for catalog queries.
//!
//! Every statement the scanner issues outside of `COPY` is a simple query,
//! so result values arrive in text format; decoding is `str::parse` plus
//! postgres' `t`/`f` booleans.
use std::fmt;

use bytes::{Buf, Bytes};

use crate::postgres::{backend::DataRow, ProtocolError};

/// One row of a simple query result.
pub struct Row {
    values: Vec<Option<Bytes>>,
}

impl Row {
    pub(crate) fn new(row: DataRow) -> Result<Row, ProtocolError> {
        let mut body = row.body;
        let mut values = Vec::with_capacity(row.column_len as usize);

        for _ in 0..row.column_len {
            if body.remaining() < 4 {
                return Err(ProtocolError::truncated("DataRow value length"));
            }
            let len = body.get_i32();
            if len == -1 {
                values.push(None);
                continue;
            }
            let len = len as usize;
            if body.remaining() < len {
                return Err(ProtocolError::truncated("DataRow value"));
            }
            values.push(Some(body.split_to(len)));
        }

        Ok(Row { values })
    }

    /// Returns the number of fields in the row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the row contains no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Try get and decode a column by index.
    pub fn try_get<R: FromField>(&self, idx: usize) -> Result<R, DecodeError> {
        let value = self.values.get(idx).ok_or(DecodeError::ColumnOutOfBounds(idx))?;
        R::from_field(value.as_deref())
    }
}

/// Type that can be constructed from a row.
pub trait FromRow: Sized {
    /// Construct self from row.
    fn from_row(row: &Row) -> Result<Self, DecodeError>;
}

impl FromRow for () {
    fn from_row(_: &Row) -> Result<Self, DecodeError> {
        Ok(())
    }
}

macro_rules! from_row_tuple {
    ($($t:ident $i:tt),*) => {
        impl<$($t),*> FromRow for ($($t,)*)
        where
            $($t: FromField),*
        {
            fn from_row(row: &Row) -> Result<Self, DecodeError> {
                Ok((
                    $(row.try_get($i)?,)*
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
from_row_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4, T5 5, T6 6);
from_row_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4, T5 5, T6 6, T7 7);
from_row_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4, T5 5, T6 6, T7 7, T8 8);
from_row_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4, T5 5, T6 6, T7 7, T8 8, T9 9);

/// A type that can be constructed from a single text-format field.
pub trait FromField: Sized {
    fn from_field(field: Option<&[u8]>) -> Result<Self, DecodeError>;
}

fn text(field: Option<&[u8]>) -> Result<&str, DecodeError> {
    let field = field.ok_or(DecodeError::UnexpectedNull)?;
    std::str::from_utf8(field).map_err(|_| DecodeError::Utf8)
}

impl FromField for String {
    fn from_field(field: Option<&[u8]>) -> Result<Self, DecodeError> {
        Ok(text(field)?.into())
    }
}

impl FromField for bool {
    fn from_field(field: Option<&[u8]>) -> Result<Self, DecodeError> {
        // boolean output is `t` or `f`
        match text(field)? {
            "t" => Ok(true),
            "f" => Ok(false),
            _ => Err(DecodeError::Parse("bool")),
        }
    }
}

macro_rules! from_field_int {
    ($($ty:ty),*) => {$(
        impl FromField for $ty {
            fn from_field(field: Option<&[u8]>) -> Result<Self, DecodeError> {
                text(field)?.parse().map_err(|_| DecodeError::Parse(stringify!($ty)))
            }
        }
    )*};
}

from_field_int!(i16, i32, i64, u32, u64);

impl<T: FromField> FromField for Option<T> {
    fn from_field(field: Option<&[u8]>) -> Result<Self, DecodeError> {
        match field {
            Some(_) => T::from_field(field).map(Some),
            None => Ok(None),
        }
    }
}

/// An error when decoding a row value.
pub enum DecodeError {
    /// Postgres returned a non utf-8 string.
    Utf8,
    /// Column requested is not in the row.
    ColumnOutOfBounds(usize),
    /// NULL in a column the caller requires.
    UnexpectedNull,
    /// Text value did not parse as the requested type.
    Parse(&'static str),
}

impl std::error::Error for DecodeError { }

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("failed to decode value, ")?;
        match self {
            DecodeError::Utf8 => f.write_str("invalid utf-8"),
            DecodeError::ColumnOutOfBounds(i) => write!(f, "column {i} out of bounds"),
            DecodeError::UnexpectedNull => f.write_str("unexpected null"),
            DecodeError::Parse(ty) => write!(f, "not a valid {ty}"),
        }
    }
}

impl fmt::Debug for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_row(values: &[Option<&[u8]>]) -> DataRow {
        use bytes::BufMut;
        let mut body = bytes::BytesMut::new();
        for v in values {
            match v {
                Some(v) => {
                    body.put_i32(v.len() as i32);
                    body.put_slice(v);
                }
                None => body.put_i32(-1),
            }
        }
        DataRow { column_len: values.len() as u16, body: body.freeze() }
    }

    #[test]
    fn decode_scalars() {
        let values = [Some(&b"42"[..]), Some(&b"t"[..]), None, Some(&b"hello"[..])];
        let row = Row::new(data_row(&values)).unwrap();
        let (n, flag, opt, s) = <(i32, bool, Option<i64>, String)>::from_row(&row).unwrap();
        assert_eq!(n, 42);
        assert!(flag);
        assert_eq!(opt, None);
        assert_eq!(s, "hello");
    }

    #[test]
    fn reject_out_of_bounds() {
        let row = Row::new(data_row(&[Some(&b"1"[..])])).unwrap();
        assert!(row.try_get::<i32>(3).is_err());
    }

    #[test]
    fn reject_null_scalar() {
        let row = Row::new(data_row(&[None])).unwrap();
        assert!(row.try_get::<i32>(0).is_err());
    }
}
