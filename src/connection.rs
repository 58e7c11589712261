//! Postgres Connection.
use bytes::Bytes;

use crate::{
    config::Config,
    postgres::{backend, frontend, BackendMessage, ProtocolError},
    row::{FromRow, Row},
    transport::PgStream,
    Error, ErrorKind, Result,
};

/// Postgres connection speaking the simple-query subprotocol.
///
/// The scanner issues every statement (transaction control, catalog queries
/// and `COPY ... TO STDOUT`) as a simple query, so there is no prepared
/// statement machinery here.
#[derive(Debug)]
pub struct Connection {
    stream: PgStream,
}

impl Connection {
    /// Perform the startup handshake with the configured server.
    ///
    /// Only cleartext password authentication is supported; MD5 and SASL
    /// requests surface as [`ErrorKind::UnsupportedAuth`].
    pub fn connect(config: &Config) -> Result<Connection> {
        let mut stream = PgStream::connect(&config.host, config.port)?;

        // To begin a session, a frontend opens a connection to the server
        // and sends a startup message.
        stream.send_startup(frontend::Startup {
            user: &config.user,
            database: Some(&config.dbname),
        });
        stream.flush()?;

        // The server then sends an appropriate authentication request message,
        // to which the frontend must reply with an appropriate authentication
        // response message (such as a password).
        loop {
            use backend::Authentication::*;
            match stream.recv()? {
                Ok => break,
                CleartextPassword => {
                    stream.send(frontend::PasswordMessage { password: &config.pass });
                    stream.flush()?;
                }
                MD5Password { .. } | Sasl { .. } => return Err(ErrorKind::UnsupportedAuth.into()),
            }
        }

        // After having received AuthenticationOk, the frontend must wait for
        // further messages from the server: ParameterStatus, BackendKeyData,
        // and finally ReadyForQuery.
        loop {
            use BackendMessage::*;
            match stream.recv()? {
                ReadyForQuery(_) => break,
                BackendKeyData(_) | ParameterStatus(_) => {}
                NegotiateProtocolVersion(v) => {
                    tracing::debug!("server negotiated protocol minor version {}", v.minor);
                }
                f => Err(ProtocolError::unexpected_phase(f.msgtype(), "startup"))?,
            }
        }

        Ok(Self { stream })
    }

    /// Run a statement, discarding any rows it may return.
    pub fn execute(&mut self, sql: &str) -> Result<()> {
        self.stream.send(frontend::Query { sql });

        loop {
            use BackendMessage::*;
            match self.stream.recv()? {
                ReadyForQuery(_) => return Ok(()),
                CommandComplete(_) | EmptyQueryResponse(_) | RowDescription(_) | DataRow(_) => {}
                // SET-like statements report the changed parameter
                ParameterStatus(_) => {}
                f => Err(ProtocolError::unexpected_phase(f.msgtype(), "execute"))?,
            }
        }
    }

    /// Run a simple query and decode every returned row.
    ///
    /// <https://www.postgresql.org/docs/current/protocol-flow.html#PROTOCOL-FLOW-SIMPLE-QUERY>
    pub fn query<R: FromRow>(&mut self, sql: &str) -> Result<Vec<R>> {
        self.stream.send(frontend::Query { sql });

        let mut rows = vec![];

        loop {
            use BackendMessage::*;
            match self.stream.recv()? {
                ReadyForQuery(_) => break,
                // Describes the column layout of the rows that follow.
                RowDescription(_) => {}
                // One of the set of rows returned by the query.
                DataRow(datarow) => {
                    let row = Row::new(datarow)?;
                    rows.push(R::from_row(&row)?);
                }
                CommandComplete(_) | EmptyQueryResponse(_) | ParameterStatus(_) => {}
                f => Err(ProtocolError::unexpected_phase(f.msgtype(), "simple query"))?,
            }
        }

        Ok(rows)
    }

    /// Run a simple query that must return exactly one row.
    pub fn query_one<R: FromRow>(&mut self, sql: &str) -> Result<R> {
        let mut rows = self.query::<R>(sql)?;
        match rows.len() {
            1 => Ok(rows.remove(0)),
            0 => Err(ErrorKind::RowNotFound.into()),
            _ => Err(Error::from(ErrorKind::RowNotFound).context("query returned multiple rows")),
        }
    }

    /// Issue a `COPY .. TO STDOUT (FORMAT binary)` and wait for the copy-out
    /// stream to open.
    pub fn copy_out(&mut self, sql: &str) -> Result<()> {
        self.stream.send(frontend::Query { sql });

        loop {
            use BackendMessage::*;
            match self.stream.recv()? {
                CopyOutResponse(res) => {
                    if res.format != 1 {
                        Err(ProtocolError::malformed("expected binary COPY format"))?;
                    }
                    return Ok(());
                }
                ParameterStatus(_) => {}
                f => Err(ProtocolError::unexpected_phase(f.msgtype(), "copy out"))?,
            }
        }
    }

    /// Receive the next `CopyData` payload of an open copy-out stream.
    ///
    /// Returns `None` once the stream is complete and the connection is back
    /// to the ready state.
    pub fn copy_chunk(&mut self) -> Result<Option<Bytes>> {
        loop {
            use BackendMessage::*;
            match self.stream.recv()? {
                CopyData(data) => return Ok(Some(data.body)),
                CopyDone(_) => {
                    self.copy_finish()?;
                    return Ok(None);
                }
                ParameterStatus(_) => {}
                f => Err(ProtocolError::unexpected_phase(f.msgtype(), "copy data"))?,
            }
        }
    }

    /// Drain the tail of a copy-out stream up to `ReadyForQuery`.
    pub fn copy_finish(&mut self) -> Result<()> {
        loop {
            use BackendMessage::*;
            match self.stream.recv()? {
                ReadyForQuery(_) => return Ok(()),
                CopyData(_) | CopyDone(_) | CommandComplete(_) | ParameterStatus(_) => {}
                f => Err(ProtocolError::unexpected_phase(f.msgtype(), "copy end"))?,
            }
        }
    }

    /// Gracefully close the connection.
    pub fn close(self) -> Result<()> {
        self.stream.close()?;
        Ok(())
    }
}
