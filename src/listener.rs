use crate::bridge;
use crate::context::Context;
use crate::error::{map_io_error, Error, ErrorCode};
use crate::io_context::SocketImpl;
use crate::socket::Socket;

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};

use socket2::{Domain, SockAddr};
use tracing::debug;

const DEFAULT_BACKLOG: i32 = 128;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ListenerState {
    Closed,
    Open,
    Listening,
}

/// Outcome of [`Listener::accept`]. The socket is always present; it is
/// `Closed` unless `error` is success.
#[derive(Debug)]
pub struct AcceptResult<'ctx> {
    pub error: Error,
    pub socket: Socket<'ctx>,
}

/// A blocking IPv4 TCP acceptor.
pub struct Listener<'ctx> {
    ctx: &'ctx Context,
    soc: Option<SocketImpl>,
    state: ListenerState,
}

impl<'ctx> Listener<'ctx> {
    pub fn new(ctx: &'ctx Context) -> Self {
        Listener {
            ctx,
            soc: None,
            state: ListenerState::Closed,
        }
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    pub fn open(&mut self) -> Error {
        let Some(sched) = self.ctx.native_handle() else {
            return ErrorCode::NotInitialized.into();
        };
        if self.state != ListenerState::Closed {
            return Error::NONE;
        }
        let soc = match SocketImpl::open(sched, Domain::IPV4) {
            Ok(soc) => soc,
            Err(_) => return ErrorCode::Unknown.into(),
        };
        if soc.socket().set_reuse_address(true).is_err() {
            return ErrorCode::Unknown.into();
        }
        self.soc = Some(soc);
        self.state = ListenerState::Open;
        Error::NONE
    }

    /// Binds to `0.0.0.0:port`. Port 0 is rejected.
    pub fn bind(&mut self, port: u16) -> Error {
        if self.ctx.native_handle().is_none() {
            return ErrorCode::NotInitialized.into();
        }
        if port == 0 {
            return ErrorCode::InvalidArgument.into();
        }
        if self.state == ListenerState::Closed {
            let err = self.open();
            if self.ctx.config().strict_checks && err.is_err() {
                return err;
            }
        }
        let Some(soc) = &self.soc else {
            return ErrorCode::AcceptFailed.into();
        };
        let addr = SockAddr::from(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)));
        match soc.socket().bind(&addr) {
            Ok(()) => Error::NONE,
            Err(err) => map_io_error(&err, ErrorCode::AcceptFailed).into(),
        }
    }

    /// Starts listening. A backlog of 0 or less means 128.
    pub fn listen(&mut self, backlog: i32) -> Error {
        if self.ctx.native_handle().is_none() {
            return ErrorCode::NotInitialized.into();
        }
        if self.ctx.config().strict_checks && self.state < ListenerState::Open {
            return ErrorCode::InvalidState.into();
        }
        let backlog = if backlog <= 0 { DEFAULT_BACKLOG } else { backlog };
        let Some(soc) = &self.soc else {
            return ErrorCode::AcceptFailed.into();
        };
        match soc.socket().listen(backlog) {
            Ok(()) => {
                self.state = ListenerState::Listening;
                if self.ctx.tracing() {
                    debug!(port = ?self.local_port(), backlog, "listener listening");
                }
                Error::NONE
            }
            Err(err) => map_io_error(&err, ErrorCode::AcceptFailed).into(),
        }
    }

    pub fn accept(&mut self) -> AcceptResult<'ctx> {
        let mut socket = Socket::new(self.ctx);
        let error = self.accept_into(&mut socket);
        AcceptResult { error, socket }
    }

    fn accept_into(&mut self, socket: &mut Socket<'ctx>) -> Error {
        let Some(sched) = self.ctx.native_handle() else {
            return ErrorCode::NotInitialized.into();
        };
        if self.ctx.config().strict_checks && self.state != ListenerState::Listening {
            return ErrorCode::InvalidState.into();
        }
        let Some(soc) = &self.soc else {
            return ErrorCode::AcceptFailed.into();
        };
        let (conn, peer) = match bridge::block_on(self.ctx, "listener.accept", soc.accept()) {
            Ok(Ok(accepted)) => accepted,
            Ok(Err(err)) => return map_io_error(&err, ErrorCode::AcceptFailed).into(),
            Err(err) => return err,
        };
        match SocketImpl::new(sched, conn) {
            Ok(conn) => {
                socket.attach(conn);
                if self.ctx.tracing() {
                    debug!(peer = ?peer.as_socket(), "connection accepted");
                }
                Error::NONE
            }
            Err(_) => ErrorCode::AcceptFailed.into(),
        }
    }

    /// Closes the listener. Safe to call any number of times.
    pub fn close(&mut self) {
        self.soc = None;
        self.state = ListenerState::Closed;
    }

    pub fn local_port(&self) -> Option<u16> {
        Some(self.soc.as_ref()?.local_addr()?.port())
    }
}

impl fmt::Debug for Listener<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Listener")
            .field("state", &self.state)
            .field("port", &self.local_port())
            .finish()
    }
}
