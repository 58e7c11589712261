//! Postgres Frontend Messages
//!
//! All struct fields here mirror the actual message sent to postgres.
use bytes::{BufMut, BytesMut};

use crate::ext::{BufMutExt, StrExt, UsizeExt};

/// write a frontend message to `buf`
pub fn write<F: FrontendProtocol>(msg: F, buf: &mut BytesMut) {
    // msgtype + length
    const PREFIX: usize = 1 + 4;

    let size = msg.size_hint();
    buf.reserve(PREFIX + size as usize);

    let offset = buf.len();
    buf.put_u8(F::MSGTYPE);
    buf.put_i32(4 + size);

    msg.encode(&mut *buf);

    assert_eq!(
        buf.len() - offset,
        PREFIX + size as usize,
        "[BUG] Frontend Message body not equal to size hint"
    );
}

/// A type which can be encoded into postgres frontend message
///
/// For historical reasons, the very first message sent by the client (the startup message)
/// has no initial message-type byte.
///
/// Thus, [`Startup`] does not implement [`FrontendProtocol`]
pub trait FrontendProtocol {
    /// message type
    const MSGTYPE: u8;

    /// size of the main body
    ///
    /// note that this is *only* the size of the main body as opposed to the
    /// actual postgres message
    fn size_hint(&self) -> i32;

    /// write the main body of the message
    ///
    /// `buf` has the length returned from `size_hint`
    fn encode(self, buf: impl BufMut);
}

/// Postgres Startup frontend message.
#[derive(Debug)]
pub struct Startup<'a> {
    /// The database user name to connect as. Required; there is no default.
    pub user: &'a str,
    /// The database to connect to. Defaults to the user name.
    pub database: Option<&'a str>,
}

impl Startup<'_> {
    pub fn write(self, buf: &mut BytesMut) {
        let offset = buf.len();

        // Length of message contents in bytes, including self.
        // reserve 4 bytes for length
        buf.put_i32(0);

        // The protocol version number.
        // The most significant 16 bits are the major version number (3 for the protocol described here).
        // The least significant 16 bits are the minor version number (0 for the protocol described here).
        buf.put_i32(196608);

        // The protocol version number is followed by one or more pairs of
        // parameter name and value strings.

        buf.put_nul_string("user");
        buf.put_nul_string(self.user);

        if let Some(db) = self.database {
            buf.put_nul_string("database");
            buf.put_nul_string(db);
        }

        // A zero byte is required as a terminator after the last name/value pair.
        buf.put_u8(b'\0');

        // write the length
        let mut written_buf = &mut buf[offset..];
        written_buf.put_i32(written_buf.len().to_i32());
    }
}

/// Identifies the message as a password response.
#[derive(Debug)]
pub struct PasswordMessage<'a> {
    /// The password (encrypted, if requested)
    pub password: &'a str,
}

impl FrontendProtocol for PasswordMessage<'_> {
    const MSGTYPE: u8 = b'p';

    fn size_hint(&self) -> i32 {
        self.password.nul_string_len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.password);
    }
}

/// Identifies the message as a simple query
pub struct Query<'a> {
    /// the query string itself
    pub sql: &'a str,
}

impl FrontendProtocol for Query<'_> {
    const MSGTYPE: u8 = b'Q';

    fn size_hint(&self) -> i32 {
        self.sql.nul_string_len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.sql);
    }
}

/// Identifies the message as a termination request, for graceful shutdown.
pub struct Terminate;

impl FrontendProtocol for Terminate {
    const MSGTYPE: u8 = b'X';

    fn size_hint(&self) -> i32 { 0 }

    fn encode(self, _: impl BufMut) { }
}
