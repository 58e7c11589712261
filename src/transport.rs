//! Blocking buffered message stream.
use std::{
    io::{Read, Write},
    net::TcpStream,
};

use bytes::{Buf, BytesMut};

use crate::{
    common::verbose,
    postgres::{backend, frontend, BackendProtocol, FrontendProtocol},
    Result,
};

const DEFAULT_BUF_CAPACITY: usize = 8 * 1024;

/// A buffered blocking stream which can send and receive postgres messages.
///
/// Workers run one blocking connection per OS thread, so the stream has no
/// notion of readiness; reads park the thread until the server responds.
///
/// `NoticeResponse` is logged and skipped here. `ErrorResponse` is decoded
/// into the server's error text and returned as [`Err`]; every database error
/// in this crate is fatal to its connection, so no resynchronization with
/// `ReadyForQuery` is attempted.
#[derive(Debug)]
pub struct PgStream {
    socket: TcpStream,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl PgStream {
    pub fn connect(host: &str, port: u16) -> std::io::Result<PgStream> {
        let socket = TcpStream::connect((host, port))?;
        socket.set_nodelay(true)?;
        Ok(Self {
            socket,
            read_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            write_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
        })
    }

    /// Buffer a frontend message; [`flush`][PgStream::flush] sends it.
    pub fn send<F: FrontendProtocol>(&mut self, message: F) {
        verbose!("(F){}", std::any::type_name::<F>());
        frontend::write(message, &mut self.write_buf);
    }

    /// Buffer the startup message.
    ///
    /// For historical reasons the startup message has no message-type byte,
    /// thus [`Startup`][frontend::Startup] does not implement
    /// [`FrontendProtocol`].
    pub fn send_startup(&mut self, startup: frontend::Startup) {
        verbose!("(F){startup:?}");
        startup.write(&mut self.write_buf);
    }

    /// Write out all buffered messages.
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.socket.write_all(&self.write_buf)?;
        self.write_buf.clear();
        self.socket.flush()
    }

    fn fill(&mut self) -> std::io::Result<()> {
        let mut chunk = [0u8; DEFAULT_BUF_CAPACITY];
        let n = self.socket.read(&mut chunk)?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "postgres closed the connection",
            ));
        }
        self.read_buf.extend_from_slice(&chunk[..n]);
        Ok(())
    }

    /// Receive one raw message frame.
    fn recv_raw(&mut self) -> Result<(u8, bytes::Bytes)> {
        if !self.write_buf.is_empty() {
            self.flush()?;
        }

        loop {
            let Some(mut header) = self.read_buf.get(..5) else {
                self.fill()?;
                continue;
            };

            let msgtype = header.get_u8();
            let len = header.get_i32() as usize;

            if self.read_buf.len() - 1/*msgtype*/ < len {
                self.read_buf.reserve(1 + len);
                self.fill()?;
                continue;
            }

            self.read_buf.advance(5);
            let body = self.read_buf.split_to(len - 4).freeze();

            verbose!("(B){}", backend::BackendMessage::message_name(msgtype));
            return Ok((msgtype, body));
        }
    }

    /// Receive a backend message.
    ///
    /// Calling `recv` will also flush buffered messages first.
    pub fn recv<B: BackendProtocol>(&mut self) -> Result<B> {
        loop {
            let (msgtype, body) = self.recv_raw()?;

            match msgtype {
                backend::ErrorResponse::MSGTYPE => {
                    let err = backend::ErrorResponse::decode(msgtype, body)?;
                    return Err(err.to_db_error().into());
                }
                backend::NoticeResponse::MSGTYPE => {
                    let notice = backend::NoticeResponse::decode(msgtype, body)?;
                    tracing::warn!("{notice}");
                }
                _ => return Ok(B::decode(msgtype, body)?),
            }
        }
    }

    /// Gracefully close the connection.
    pub fn close(mut self) -> std::io::Result<()> {
        self.send(frontend::Terminate);
        self.flush()?;
        self.socket.shutdown(std::net::Shutdown::Both)
    }
}
