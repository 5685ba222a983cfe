use crate::io_context::{Direction, SocketImpl};

use std::future::poll_fn;
use std::io::{self, Read, Write};
use std::rc::Rc;
use std::task::{Context, Poll};

use openssl::error::ErrorStack;
use openssl::ssl::{self, ErrorCode as SslErrorCode, Ssl, SslRef, SslStream};

/// Non-blocking byte pipe between OpenSSL and the reactor-registered socket.
pub(crate) struct Transport(Rc<SocketImpl>);

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read_nb(buf)
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write_nb(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub(crate) struct Engine {
    stream: SslStream<Transport>,
}

impl Engine {
    pub fn new(ssl: Ssl, soc: Rc<SocketImpl>) -> Result<Self, ErrorStack> {
        Ok(Engine {
            stream: SslStream::new(ssl, Transport(soc))?,
        })
    }

    pub fn ssl(&self) -> &SslRef {
        self.stream.ssl()
    }

    /// Retries `op` until OpenSSL stops asking for more I/O, parking on the
    /// readiness direction it asked for.
    fn poll_op<T, F>(&mut self, cx: &mut Context<'_>, mut op: F) -> Poll<Result<T, ssl::Error>>
    where
        F: FnMut(&mut SslStream<Transport>) -> Result<T, ssl::Error>,
    {
        loop {
            let err = match op(&mut self.stream) {
                Ok(val) => return Poll::Ready(Ok(val)),
                Err(err) => err,
            };
            let dir = if err.code() == SslErrorCode::WANT_READ {
                Direction::Read
            } else if err.code() == SslErrorCode::WANT_WRITE {
                Direction::Write
            } else {
                return Poll::Ready(Err(err));
            };
            let soc = &self.stream.get_ref().0;
            if !soc.is_ready(dir) {
                soc.set_waker(dir, cx);
                return Poll::Pending;
            }
        }
    }

    pub async fn handshake(&mut self) -> Result<(), ssl::Error> {
        poll_fn(|cx| self.poll_op(cx, |s| s.do_handshake())).await
    }

    /// A close_notify from the peer reads as 0 bytes.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ssl::Error> {
        poll_fn(|cx| {
            self.poll_op(cx, |s| match s.ssl_read(buf) {
                Err(err) if err.code() == SslErrorCode::ZERO_RETURN => Ok(0),
                res => res,
            })
        })
        .await
    }

    pub async fn write(&mut self, buf: &[u8]) -> Result<usize, ssl::Error> {
        poll_fn(|cx| self.poll_op(cx, |s| s.ssl_write(buf))).await
    }

    pub async fn shutdown(&mut self) -> Result<(), ssl::Error> {
        poll_fn(|cx| self.poll_op(cx, |s| s.shutdown().map(|_| ()))).await
    }
}
