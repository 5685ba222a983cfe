use super::Interrupter;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::rc::Rc;
use std::sync::Arc;
use std::task::Waker;
use std::time::Duration;

use bitflags::bitflags;
use libc::{
    c_int, epoll_create1, epoll_ctl, epoll_event, epoll_wait, EPOLLERR, EPOLLET, EPOLLHUP, EPOLLIN,
    EPOLLOUT, EPOLLRDHUP, EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EINTR,
};

const INTR_TOKEN: u64 = 0;
const MAX_EVENTS: usize = 64;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Ready: u8 {
        const READABLE = 0b01;
        const WRITABLE = 0b10;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    fn ready(self) -> Ready {
        match self {
            Direction::Read => Ready::READABLE,
            Direction::Write => Ready::WRITABLE,
        }
    }
}

/// Readiness of one registered descriptor plus the task waiting on each side.
pub struct IoState {
    ready: Cell<Ready>,
    read_waker: Cell<Option<Waker>>,
    write_waker: Cell<Option<Waker>>,
}

impl IoState {
    fn new() -> Self {
        // Optimistic: the first attempt goes straight to the syscall.
        IoState {
            ready: Cell::new(Ready::READABLE | Ready::WRITABLE),
            read_waker: Cell::new(None),
            write_waker: Cell::new(None),
        }
    }

    pub fn is_ready(&self, dir: Direction) -> bool {
        self.ready.get().contains(dir.ready())
    }

    pub fn clear_ready(&self, dir: Direction) {
        self.ready.set(self.ready.get() - dir.ready())
    }

    pub fn set_waker(&self, dir: Direction, waker: &Waker) {
        let slot = match dir {
            Direction::Read => &self.read_waker,
            Direction::Write => &self.write_waker,
        };
        slot.set(Some(waker.clone()));
    }

    fn dispatch(&self, events: u32) {
        let mut ready = self.ready.get();
        let readable = (EPOLLIN | EPOLLRDHUP | EPOLLHUP | EPOLLERR) as u32;
        let writable = (EPOLLOUT | EPOLLHUP | EPOLLERR) as u32;
        let mut wake = Vec::with_capacity(2);

        if events & readable != 0 {
            ready |= Ready::READABLE;
            wake.extend(self.read_waker.take());
        }
        if events & writable != 0 {
            ready |= Ready::WRITABLE;
            wake.extend(self.write_waker.take());
        }
        self.ready.set(ready);
        for waker in wake {
            waker.wake();
        }
    }
}

pub struct EpollReactor {
    epfd: OwnedFd,
    intr: Arc<Interrupter>,
    sources: RefCell<HashMap<u64, Rc<IoState>>>,
    next_token: Cell<u64>,
}

impl EpollReactor {
    pub fn new(intr: Arc<Interrupter>) -> io::Result<Self> {
        let epfd = libc_try!(epoll_create1(EPOLL_CLOEXEC));
        let reactor = EpollReactor {
            epfd: unsafe { OwnedFd::from_raw_fd(epfd) },
            intr,
            sources: RefCell::default(),
            next_token: Cell::new(INTR_TOKEN + 1),
        };
        reactor.epoll_ctl(EPOLL_CTL_ADD, reactor.intr.as_raw_fd(), EPOLLIN | EPOLLET, INTR_TOKEN)?;
        Ok(reactor)
    }

    fn epoll_ctl(&self, op: c_int, fd: RawFd, events: c_int, token: u64) -> io::Result<()> {
        let mut ev = epoll_event {
            events: events as u32,
            u64: token,
        };
        libc_try!(epoll_ctl(self.epfd.as_raw_fd(), op, fd, &mut ev));
        Ok(())
    }

    pub fn register(&self, fd: RawFd) -> io::Result<(u64, Rc<IoState>)> {
        let token = self.next_token.get();
        self.next_token.set(token + 1);
        self.epoll_ctl(EPOLL_CTL_ADD, fd, EPOLLIN | EPOLLOUT | EPOLLRDHUP | EPOLLET, token)?;

        let state = Rc::new(IoState::new());
        self.sources.borrow_mut().insert(token, state.clone());
        Ok((token, state))
    }

    pub fn deregister(&self, token: u64, fd: RawFd) {
        self.sources.borrow_mut().remove(&token);
        let _ = self.epoll_ctl(EPOLL_CTL_DEL, fd, 0, token);
    }

    /// Blocks until at least one descriptor is ready, the interrupter fires
    /// or `timeout` elapses. `None` waits forever.
    pub fn wait(&self, timeout: Option<Duration>, events: &mut [epoll_event]) -> io::Result<usize> {
        let timeout = match timeout {
            Some(dur) => dur.as_millis().min(c_int::MAX as u128) as c_int,
            None => -1,
        };
        let len = events.len().min(c_int::MAX as usize) as c_int;
        match unsafe { epoll_wait(self.epfd.as_raw_fd(), events.as_mut_ptr(), len, timeout) } {
            -1 => match errno::errno().0 {
                EINTR => Ok(0),
                err => Err(io::Error::from_raw_os_error(err)),
            },
            n => Ok(n as usize),
        }
    }

    pub fn dispatch(&self, events: &[epoll_event]) {
        for ev in events {
            let token = ev.u64;
            let bits = ev.events;
            if token == INTR_TOKEN {
                self.intr.reset();
                continue;
            }
            let state = self.sources.borrow().get(&token).cloned();
            if let Some(state) = state {
                state.dispatch(bits);
            }
        }
    }

    pub fn event_buffer() -> [epoll_event; MAX_EVENTS] {
        [epoll_event { events: 0, u64: 0 }; MAX_EVENTS]
    }
}
