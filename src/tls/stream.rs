use super::engine::Engine;
use super::{TlsContext, TlsIoResult, TlsRole, TlsState, TlsVerifyMode};
use crate::bridge;
use crate::error::{Error, ErrorCode};
use crate::socket::{Socket, SocketState};

use std::fmt;
use std::io;

use openssl::ssl::Ssl;
use openssl::x509::X509VerifyResult;
use tracing::debug;

/// A TLS session over a connected [`Socket`].
///
/// The stream borrows the socket for its whole life and closes it on
/// [`close`](TlsStream::close) or drop.
pub struct TlsStream<'s, 'ctx> {
    socket: &'s mut Socket<'ctx>,
    tls: &'s TlsContext,
    engine: Option<Engine>,
    state: TlsState,
}

impl<'s, 'ctx> TlsStream<'s, 'ctx> {
    pub fn new(socket: &'s mut Socket<'ctx>, tls: &'s TlsContext) -> Self {
        let engine = Self::make_engine(socket, tls);
        TlsStream {
            socket,
            tls,
            engine,
            state: TlsState::Unestablished,
        }
    }

    fn make_engine(socket: &Socket<'ctx>, tls: &TlsContext) -> Option<Engine> {
        let ctx = tls.freeze()?;
        if socket.state() != SocketState::Connected {
            return None;
        }
        let soc = socket.inner()?.clone();

        let mut ssl = Ssl::new(ctx).ok()?;
        match tls.role() {
            TlsRole::Client => {
                ssl.set_connect_state();
                if let Some(host) = tls.hostname() {
                    ssl.set_hostname(host).ok()?;
                    if tls.verify_mode() != TlsVerifyMode::None {
                        ssl.param_mut().set_host(host).ok()?;
                    }
                }
            }
            TlsRole::Server => ssl.set_accept_state(),
        }
        Engine::new(ssl, soc).ok()
    }

    pub fn state(&self) -> TlsState {
        self.state
    }

    pub fn handshake(&mut self) -> Error {
        let ctx = self.socket.context();
        let Some(engine) = self.engine.as_mut() else {
            return ErrorCode::NotInitialized.into();
        };
        if ctx.config().strict_checks && self.state != TlsState::Unestablished {
            return ErrorCode::InvalidState.into();
        }
        let err = match bridge::block_on(ctx, "tls.handshake", engine.handshake()) {
            Ok(Ok(())) => Error::NONE,
            Ok(Err(err)) => {
                let verify = engine.ssl().verify_result();
                if ctx.tracing() {
                    debug!(%err, %verify, "TLS handshake failed");
                }
                if verify != X509VerifyResult::OK {
                    ErrorCode::TlsVerifyFailed.into()
                } else {
                    ErrorCode::TlsHandshakeFailed.into()
                }
            }
            Err(err) => err,
        };
        if err.ok() {
            self.state = TlsState::Established;
            if ctx.tracing() {
                debug!(role = ?self.tls.role(), alpn = ?self.negotiated_alpn(), "TLS established");
            }
        }
        err
    }

    fn check_io(&self, empty: bool) -> Result<(), ErrorCode> {
        if self.engine.is_none() {
            return Err(ErrorCode::NotInitialized);
        }
        if empty {
            return Err(ErrorCode::InvalidArgument);
        }
        if self.socket.context().config().strict_checks && self.state != TlsState::Established {
            return Err(ErrorCode::InvalidState);
        }
        Ok(())
    }

    pub fn read_some(&mut self, buf: &mut [u8]) -> TlsIoResult {
        if let Err(code) = self.check_io(buf.is_empty()) {
            return TlsIoResult::failed(code);
        }
        let ctx = self.socket.context();
        let Some(engine) = self.engine.as_mut() else {
            return TlsIoResult::failed(ErrorCode::NotInitialized);
        };
        let res = bridge::block_on(ctx, "tls.read_some", engine.read(buf));
        TlsIoResult::from_outcome(res, ErrorCode::ReadFailed)
    }

    pub fn write_some(&mut self, buf: &[u8]) -> TlsIoResult {
        if let Err(code) = self.check_io(buf.is_empty()) {
            return TlsIoResult::failed(code);
        }
        let ctx = self.socket.context();
        let Some(engine) = self.engine.as_mut() else {
            return TlsIoResult::failed(ErrorCode::NotInitialized);
        };
        let res = bridge::block_on(ctx, "tls.write_some", engine.write(buf));
        TlsIoResult::from_outcome(res, ErrorCode::WriteFailed)
    }

    /// Sends close_notify. The socket stays open.
    pub fn shutdown(&mut self) -> Error {
        let ctx = self.socket.context();
        let Some(engine) = self.engine.as_mut() else {
            return ErrorCode::NotInitialized.into();
        };
        let res = bridge::block_on(ctx, "tls.shutdown", engine.shutdown());
        let err = bridge::outcome_error(res, ErrorCode::TlsShutdownFailed);
        if err.ok() {
            self.state = TlsState::ShutDown;
        }
        err
    }

    /// Shuts the session down if it is established, then closes the socket.
    /// Safe to call any number of times.
    pub fn close(&mut self) {
        if self.state == TlsState::Closed {
            return;
        }
        if self.state == TlsState::Established {
            let _ = self.shutdown();
        }
        self.engine = None;
        self.socket.close();
        self.state = TlsState::Closed;
    }

    /// The protocol agreed on through ALPN, if any.
    pub fn negotiated_alpn(&self) -> Option<String> {
        let proto = self.engine.as_ref()?.ssl().selected_alpn_protocol()?;
        Some(String::from_utf8_lossy(proto).into_owned())
    }

    pub fn get_ref(&self) -> &Socket<'ctx> {
        self.socket
    }
}

impl Drop for TlsStream<'_, '_> {
    fn drop(&mut self) {
        self.close()
    }
}

impl io::Read for TlsStream<'_, '_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let res = self.read_some(buf);
        match res.error.into_result() {
            Ok(()) => Ok(res.bytes),
            Err(err) => Err(io::Error::new(io::ErrorKind::Other, err)),
        }
    }
}

impl io::Write for TlsStream<'_, '_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let res = self.write_some(buf);
        match res.error.into_result() {
            Ok(()) => Ok(res.bytes),
            Err(err) => Err(io::Error::new(io::ErrorKind::Other, err)),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Debug for TlsStream<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TlsStream")
            .field("state", &self.state)
            .field("role", &self.tls.role())
            .field("socket", &self.socket)
            .finish()
    }
}
