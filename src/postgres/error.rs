//! Protocol error
use std::fmt;

use bytes::{Buf, Bytes};

use crate::ext::BytesExt;

/// An error when translating buffer from postgres.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unexpected message type {found}, expected {expect}")]
    Unexpected { expect: u8, found: u8 },
    #[error("unexpected message type {found} in {phase}")]
    UnexpectedPhase { found: u8, phase: &'static str },
    #[error("unknown message type {msgtype}")]
    Unknown { msgtype: u8 },
    #[error("unknown authentication request ({auth})")]
    UnknownAuth { auth: u32 },
    #[error("truncated message while reading {what}")]
    Truncated { what: &'static str },
    #[error("malformed message: {what}")]
    Malformed { what: &'static str },
}

impl ProtocolError {
    pub(crate) fn unknown(msgtype: u8) -> ProtocolError {
        Self::Unknown { msgtype }
    }

    pub(crate) fn unexpected(expect: u8, found: u8) -> ProtocolError {
        Self::Unexpected { expect, found }
    }

    pub(crate) fn unexpected_phase(found: u8, phase: &'static str) -> ProtocolError {
        Self::UnexpectedPhase { found, phase }
    }

    pub(crate) fn unknown_auth(auth: u32) -> ProtocolError {
        Self::UnknownAuth { auth }
    }

    pub(crate) fn truncated(what: &'static str) -> ProtocolError {
        Self::Truncated { what }
    }

    pub(crate) fn malformed(what: &'static str) -> ProtocolError {
        Self::Malformed { what }
    }
}

/// An error reported by the server through `ErrorResponse`.
///
/// The message body consists of one or more identified fields, followed by
/// a zero byte as a terminator. Fields can appear in any order, and fields
/// of unrecognized type are silently ignored.
#[derive(Debug, Clone)]
pub struct DatabaseError {
    pub severity: String,
    pub code: String,
    pub message: String,
}

impl DatabaseError {
    /// Parse the identified fields of an `ErrorResponse`/`NoticeResponse` body.
    pub(crate) fn parse(mut body: Bytes) -> DatabaseError {
        let mut err = DatabaseError {
            severity: String::new(),
            code: String::new(),
            message: String::new(),
        };

        while body.has_remaining() {
            let field = body.get_u8();
            if field == 0 {
                break;
            }
            let Ok(value) = body.get_nul_bytestr() else {
                break;
            };
            match field {
                b'S' => err.severity = value.as_str().into(),
                b'C' => err.code = value.as_str().into(),
                b'M' => err.message = value.as_str().into(),
                _ => {}
            }
        }

        err
    }
}

impl std::error::Error for DatabaseError { }

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)?;
        if !self.code.is_empty() {
            write!(f, " (SQLSTATE {})", self.code)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_fields() {
        let body = Bytes::from_static(b"SERROR\0C42P01\0Mrelation does not exist\0\0");
        let err = DatabaseError::parse(body);
        assert_eq!(err.severity, "ERROR");
        assert_eq!(err.code, "42P01");
        assert_eq!(err.message, "relation does not exist");
        assert_eq!(err.to_string(), "ERROR: relation does not exist (SQLSTATE 42P01)");
    }

    #[test]
    fn unknown_fields_are_skipped() {
        let body = Bytes::from_static(b"Vfoo\0Mboom\0\0");
        let err = DatabaseError::parse(body);
        assert_eq!(err.message, "boom");
        assert!(err.code.is_empty());
    }
}
