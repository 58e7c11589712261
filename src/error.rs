//! `postscan` error types.
use std::{backtrace::Backtrace, borrow::Cow, fmt, io, str::Utf8Error};

use crate::{
    config::ParseError,
    postgres::{DatabaseError, ProtocolError},
    row::DecodeError,
};

/// A specialized [`Result`] type for `postscan` operation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All possible error from the `postscan` library.
pub struct Error {
    context: String,
    backtrace: Backtrace,
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Returns `true` for the cooperative-cancellation termination.
    pub fn is_canceled(&self) -> bool {
        matches!(self.kind, ErrorKind::Canceled)
    }

    pub(crate) fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }
}

/// All possible error kind from the `postscan` library.
pub enum ErrorKind {
    /// Invalid connection string.
    Config(ParseError),
    /// Malformed or unexpected backend message.
    Protocol(ProtocolError),
    /// Transport failure, fatal to the owning connection.
    ConnectionError(io::Error),
    /// An `ErrorResponse` from the server, carrying the server's error text.
    Database(DatabaseError),
    /// Authentication method requested by the server is not supported.
    UnsupportedAuth,
    /// Failed to decode a catalog query value.
    Decode(DecodeError),
    /// Postgres returned a non utf-8 string.
    Utf8(Utf8Error),
    /// Catalog query expected a row and got none.
    RowNotFound,
    /// Projection or predicate referenced a column outside the schema.
    ColumnIndexOutOfBounds,
    /// The relation does not exist (or matched more than one entry).
    TableNotFound { schema: String, table: String },
    /// The relation has no user columns.
    EmptyRelation { table: String },
    /// A value arrived through a decode path that is not implemented.
    UnsupportedType(Cow<'static, str>),
    /// Enum label missing from the mapped label set.
    UnknownEnumLabel(String),
    /// Predicate node that cannot be pushed down.
    UnsupportedPredicate(Cow<'static, str>),
    /// Cooperative cancellation, a clean termination rather than a failure.
    Canceled,
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                let backtrace = std::backtrace::Backtrace::capture();
                Self { context: String::new(), backtrace, kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<ParseError>e => ErrorKind::Config(e));
from!(<ProtocolError>e => ErrorKind::Protocol(e));
from!(<io::Error>e => ErrorKind::ConnectionError(e));
from!(<DatabaseError>e => ErrorKind::Database(e));
from!(<DecodeError>e => ErrorKind::Decode(e));
from!(<Utf8Error>e => ErrorKind::Utf8(e));

impl std::error::Error for Error { }

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.context.is_empty() {
            write!(f, "{}: ", self.context)?;
        }

        fmt::Display::fmt(&self.kind, f)?;

        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            let mut backtrace = self.backtrace.to_string();
            write!(f, "\n\n")?;
            writeln!(f, "Stack backtrace:")?;
            backtrace.truncate(backtrace.trim_end().len());
            write!(f, "{}", backtrace)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for ErrorKind { }

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => e.fmt(f),
            Self::Protocol(e) => write!(f, "protocol error: {e}"),
            Self::ConnectionError(e) => write!(f, "connection error: {e}"),
            Self::Database(e) => e.fmt(f),
            Self::UnsupportedAuth => f.write_str("authentication method not supported"),
            Self::Decode(e) => e.fmt(f),
            Self::Utf8(e) => e.fmt(f),
            Self::RowNotFound => f.write_str("query returned no rows"),
            Self::ColumnIndexOutOfBounds => f.write_str("column index out of bounds"),
            Self::TableNotFound { schema, table } => {
                write!(f, "postgres table \"{schema}\".\"{table}\" not found")
            }
            Self::EmptyRelation { table } => {
                write!(f, "table \"{table}\" does not contain any columns")
            }
            Self::UnsupportedType(what) => write!(f, "unsupported type: {what}"),
            Self::UnknownEnumLabel(label) => write!(f, "could not map enum value {label:?}"),
            Self::UnsupportedPredicate(what) => write!(f, "unsupported predicate: {what}"),
            Self::Canceled => f.write_str("scan canceled"),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
