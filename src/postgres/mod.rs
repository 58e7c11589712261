//! Postgres Frontend and Backend Protocol
//!
//! Docs here mostly quoted from the official postgres documentation.
//!
//! ## Messaging Overview
//!
//! All communication is through a stream of messages. The first byte of a message identifies the message type,
//! and the next four bytes specify the length of the rest of the message (this length count includes itself,
//! but not the message-type byte). The remaining contents of the message are determined by the message type.
//!
//! ```text
//! ┏━━━━┳━━━━━━━━━━━━━━━━━━━┳━━━━━━┓
//! ┃ Ty ┃       Length      ┃ Body ┃
//! ┣━━━━╋━━━━━━━━━━━━━━━━━━━╋━━━━━━┫
//! ┃ u8 ┃        u32        ┃ [u8] ┃
//! ┗━━━━┻━━━━━━━━━━━━━━━━━━━┻━━━━━━┛
//! ```
//!
//! For historical reasons, the very first message sent by the client (the startup message)
//! has no initial message-type byte.
//!
//! Only the subset of the protocol the scanner rides on is implemented:
//! startup and cleartext authentication, the simple query subprotocol, and
//! `COPY ... TO STDOUT` in binary format.
//!
//! <https://www.postgresql.org/docs/17/protocol-overview.html>

pub mod frontend;
pub mod backend;

mod error;

/// Postgres object identifier.
///
/// The oid type is implemented as an unsigned four-byte integer.
///
/// <https://www.postgresql.org/docs/current/datatype-oid.html>
pub type Oid = u32;

pub use frontend::FrontendProtocol;
pub use backend::{BackendMessage, BackendProtocol, ErrorResponse, NoticeResponse};
pub use error::{DatabaseError, ProtocolError};
