use super::{Direction, IoState, Scheduler};

use std::future::poll_fn;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::os::unix::io::{AsRawFd, RawFd};
use std::rc::Rc;
use std::task::{Context, Poll};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

/// A non-blocking TCP socket registered with the scheduler's reactor.
pub struct SocketImpl {
    soc: Socket,
    token: u64,
    io: Rc<IoState>,
    sched: Rc<Scheduler>,
}

impl SocketImpl {
    pub fn new(sched: &Rc<Scheduler>, soc: Socket) -> io::Result<Self> {
        soc.set_nonblocking(true)?;
        let (token, io) = sched.reactor().register(soc.as_raw_fd())?;
        Ok(SocketImpl {
            soc,
            token,
            io,
            sched: sched.clone(),
        })
    }

    pub fn open(sched: &Rc<Scheduler>, domain: Domain) -> io::Result<Self> {
        let soc = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        Self::new(sched, soc)
    }

    pub fn socket(&self) -> &Socket {
        &self.soc
    }

    pub fn domain(&self) -> io::Result<Domain> {
        Ok(self.soc.local_addr()?.domain())
    }

    pub fn is_ready(&self, dir: Direction) -> bool {
        self.io.is_ready(dir)
    }

    pub fn set_waker(&self, dir: Direction, cx: &Context<'_>) {
        self.io.set_waker(dir, cx.waker())
    }

    /// Runs `f` once readiness allows, retrying after each readiness edge
    /// until it stops reporting `WouldBlock`.
    pub fn poll_io<T, F>(&self, cx: &mut Context<'_>, dir: Direction, mut f: F) -> Poll<io::Result<T>>
    where
        F: FnMut() -> io::Result<T>,
    {
        loop {
            if !self.io.is_ready(dir) {
                self.io.set_waker(dir, cx.waker());
                return Poll::Pending;
            }
            match f() {
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => self.io.clear_ready(dir),
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => {}
                res => return Poll::Ready(res),
            }
        }
    }

    /// One non-blocking read. Clears read readiness when the kernel has nothing.
    pub fn read_nb(&self, buf: &mut [u8]) -> io::Result<usize> {
        let res = (&self.soc).read(buf);
        if matches!(res, Err(ref err) if err.kind() == io::ErrorKind::WouldBlock) {
            self.io.clear_ready(Direction::Read);
        }
        res
    }

    pub fn write_nb(&self, buf: &[u8]) -> io::Result<usize> {
        let res = (&self.soc).write(buf);
        if matches!(res, Err(ref err) if err.kind() == io::ErrorKind::WouldBlock) {
            self.io.clear_ready(Direction::Write);
        }
        res
    }

    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        poll_fn(|cx| self.poll_io(cx, Direction::Read, || self.read_nb(buf))).await
    }

    pub async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        poll_fn(|cx| self.poll_io(cx, Direction::Write, || self.write_nb(buf))).await
    }

    pub async fn connect(&self, addr: SocketAddr) -> io::Result<()> {
        match self.soc.connect(&SockAddr::from(addr)) {
            Ok(()) => return Ok(()),
            Err(err) if err.raw_os_error() == Some(libc::EINPROGRESS) => {}
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
            Err(err) => return Err(err),
        }

        poll_fn(|cx| {
            self.poll_io(cx, Direction::Write, || {
                if let Some(err) = self.soc.take_error()? {
                    return Err(err);
                }
                match self.soc.peer_addr() {
                    Ok(_) => Ok(()),
                    // Woken before the handshake finished.
                    Err(err) if err.raw_os_error() == Some(libc::ENOTCONN) => {
                        Err(io::ErrorKind::WouldBlock.into())
                    }
                    Err(err) => Err(err),
                }
            })
        })
        .await
    }

    pub async fn accept(&self) -> io::Result<(Socket, SockAddr)> {
        poll_fn(|cx| self.poll_io(cx, Direction::Read, || self.soc.accept())).await
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.soc.peer_addr().ok()?.as_socket()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.soc.local_addr().ok()?.as_socket()
    }
}

impl AsRawFd for SocketImpl {
    fn as_raw_fd(&self) -> RawFd {
        self.soc.as_raw_fd()
    }
}

impl Drop for SocketImpl {
    fn drop(&mut self) {
        self.sched.reactor().deregister(self.token, self.soc.as_raw_fd());
    }
}
