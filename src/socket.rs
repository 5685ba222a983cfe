use crate::bridge::{self, IoOutcome};
use crate::context::Context;
use crate::error::{Error, ErrorCode};
use crate::io_context::SocketImpl;

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::rc::Rc;

use socket2::Domain;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SocketState {
    Closed,
    Open,
    Connected,
}

/// A connect target: `localhost`, `127.0.0.1` or a numeric IP address.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TcpEndpoint {
    pub address: String,
    pub port: u16,
}

impl TcpEndpoint {
    pub fn new<S: Into<String>>(address: S, port: u16) -> Self {
        TcpEndpoint {
            address: address.into(),
            port,
        }
    }
}

impl From<SocketAddr> for TcpEndpoint {
    fn from(addr: SocketAddr) -> Self {
        TcpEndpoint::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for TcpEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.address.contains(':') {
            write!(f, "[{}]:{}", self.address, self.port)
        } else {
            write!(f, "{}:{}", self.address, self.port)
        }
    }
}

/// Outcome of a byte transfer. `bytes` is 0 whenever `error` is set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IoResult {
    pub error: Error,
    pub bytes: usize,
}

impl IoResult {
    pub(crate) fn failed(code: ErrorCode) -> Self {
        IoResult {
            error: Error::new(code),
            bytes: 0,
        }
    }

    pub(crate) fn from_outcome<R: IoOutcome>(res: Result<R, Error>, fallback: ErrorCode) -> Self {
        match res {
            Ok(out) => match out.code(fallback) {
                ErrorCode::None => IoResult {
                    error: Error::NONE,
                    bytes: out.bytes(),
                },
                code => IoResult::failed(code),
            },
            Err(err) => IoResult {
                error: err,
                bytes: 0,
            },
        }
    }

    pub fn ok(&self) -> bool {
        self.error.ok()
    }
}

fn parse_endpoint(ep: &TcpEndpoint) -> Option<SocketAddr> {
    if ep.port == 0 {
        return None;
    }
    let ip = match ep.address.as_str() {
        "localhost" => IpAddr::V4(Ipv4Addr::LOCALHOST),
        addr => addr.parse().ok()?,
    };
    Some(SocketAddr::new(ip, ep.port))
}

/// A blocking TCP stream socket bound to one [`Context`].
pub struct Socket<'ctx> {
    ctx: &'ctx Context,
    soc: Option<Rc<SocketImpl>>,
    state: SocketState,
}

impl<'ctx> Socket<'ctx> {
    pub fn new(ctx: &'ctx Context) -> Self {
        Socket {
            ctx,
            soc: None,
            state: SocketState::Closed,
        }
    }

    pub fn state(&self) -> SocketState {
        self.state
    }

    pub fn context(&self) -> &'ctx Context {
        self.ctx
    }

    pub fn open(&mut self) -> Error {
        self.open_domain(Domain::IPV4)
    }

    fn open_domain(&mut self, domain: Domain) -> Error {
        let Some(sched) = self.ctx.native_handle() else {
            return ErrorCode::NotInitialized.into();
        };
        if self.state != SocketState::Closed {
            return Error::NONE;
        }
        match SocketImpl::open(sched, domain) {
            Ok(soc) => {
                self.soc = Some(Rc::new(soc));
                self.state = SocketState::Open;
                Error::NONE
            }
            Err(err) => {
                if self.ctx.tracing() {
                    debug!(%err, "socket open failed");
                }
                ErrorCode::Unknown.into()
            }
        }
    }

    pub fn connect(&mut self, ep: &TcpEndpoint) -> Error {
        if self.ctx.native_handle().is_none() {
            return ErrorCode::NotInitialized.into();
        }
        let Some(addr) = parse_endpoint(ep) else {
            return ErrorCode::InvalidArgument.into();
        };
        let domain = Domain::for_address(addr);
        let prev = self.state;

        if self.state == SocketState::Open
            && self.soc.as_ref().and_then(|soc| soc.domain().ok()) != Some(domain)
        {
            self.close();
        }
        if self.state == SocketState::Closed {
            let err = self.open_domain(domain);
            if self.ctx.config().strict_checks && err.is_err() {
                self.restore(prev);
                return err;
            }
        }

        let Some(soc) = self.soc.clone() else {
            self.restore(prev);
            return ErrorCode::ConnectFailed.into();
        };
        let res = bridge::block_on(self.ctx, "socket.connect", soc.connect(addr));
        let err = bridge::outcome_error(res, ErrorCode::ConnectFailed);
        if err.ok() {
            self.state = SocketState::Connected;
            if self.ctx.tracing() {
                debug!(peer = %addr, "socket connected");
            }
        } else {
            self.restore(prev);
        }
        err
    }

    // A socket whose connect failed cannot be reused, so put back a fresh one.
    // The old descriptor stays when a new one cannot be created.
    fn restore(&mut self, prev: SocketState) {
        match prev {
            SocketState::Connected => {}
            SocketState::Open => {
                let Some(sched) = self.ctx.native_handle() else {
                    return self.close();
                };
                match SocketImpl::open(sched, Domain::IPV4) {
                    Ok(soc) => self.soc = Some(Rc::new(soc)),
                    Err(err) => {
                        if self.ctx.tracing() {
                            debug!(%err, "socket reopen after failed connect failed");
                        }
                    }
                }
                self.state = if self.soc.is_some() {
                    SocketState::Open
                } else {
                    SocketState::Closed
                };
            }
            SocketState::Closed => self.close(),
        }
    }

    pub fn read_some(&mut self, buf: &mut [u8]) -> IoResult {
        if self.ctx.native_handle().is_none() {
            return IoResult::failed(ErrorCode::NotInitialized);
        }
        if buf.is_empty() {
            return IoResult::failed(ErrorCode::InvalidArgument);
        }
        if self.ctx.config().strict_checks && self.state != SocketState::Connected {
            return IoResult::failed(ErrorCode::InvalidState);
        }
        let Some(soc) = self.soc.clone() else {
            return IoResult::failed(ErrorCode::ReadFailed);
        };
        let res = bridge::block_on(self.ctx, "socket.read_some", soc.read(buf));
        IoResult::from_outcome(res, ErrorCode::ReadFailed)
    }

    pub fn write_some(&mut self, buf: &[u8]) -> IoResult {
        if self.ctx.native_handle().is_none() {
            return IoResult::failed(ErrorCode::NotInitialized);
        }
        if buf.is_empty() {
            return IoResult::failed(ErrorCode::InvalidArgument);
        }
        if self.ctx.config().strict_checks && self.state != SocketState::Connected {
            return IoResult::failed(ErrorCode::InvalidState);
        }
        let Some(soc) = self.soc.clone() else {
            return IoResult::failed(ErrorCode::WriteFailed);
        };
        let res = bridge::block_on(self.ctx, "socket.write_some", soc.write(buf));
        IoResult::from_outcome(res, ErrorCode::WriteFailed)
    }

    /// Closes the socket. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.soc.take().is_some() && self.ctx.tracing() {
            debug!(state = ?self.state, "socket closed");
        }
        self.state = SocketState::Closed;
    }

    pub fn peer_endpoint(&self) -> Option<TcpEndpoint> {
        self.soc.as_ref()?.peer_addr().map(TcpEndpoint::from)
    }

    pub fn local_port(&self) -> Option<u16> {
        Some(self.soc.as_ref()?.local_addr()?.port())
    }

    pub(crate) fn inner(&self) -> Option<&Rc<SocketImpl>> {
        self.soc.as_ref()
    }

    pub(crate) fn attach(&mut self, soc: SocketImpl) {
        self.soc = Some(Rc::new(soc));
        self.state = SocketState::Connected;
    }
}

impl io::Read for Socket<'_> {
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

impl io::Write for Socket<'_> {
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

impl fmt::Debug for Socket<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Socket")
            .field("state", &self.state)
            .field("peer", &self.peer_endpoint())
            .finish()
    }
}
