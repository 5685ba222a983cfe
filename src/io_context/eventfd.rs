use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use libc::{eventfd, EFD_CLOEXEC, EFD_NONBLOCK};

/// Wakes a thread blocked in `epoll_wait` from anywhere.
pub struct EventFdInterrupter {
    efd: OwnedFd,
}

impl EventFdInterrupter {
    pub fn new() -> io::Result<Self> {
        let efd = libc_try!(eventfd(0, EFD_CLOEXEC | EFD_NONBLOCK));
        Ok(EventFdInterrupter {
            efd: unsafe { OwnedFd::from_raw_fd(efd) },
        })
    }

    pub fn interrupt(&self) -> io::Result<()> {
        let buf = 1u64.to_ne_bytes();
        let rc = unsafe { libc::write(self.efd.as_raw_fd(), buf.as_ptr() as *const _, buf.len()) };
        if rc < 0 {
            let err = errno::errno();
            // A saturated counter already has a wakeup pending.
            if err.0 != libc::EAGAIN {
                return Err(io::Error::from_raw_os_error(err.0));
            }
        }
        Ok(())
    }

    pub fn reset(&self) {
        let mut buf = [0u8; 8];
        unsafe { libc::read(self.efd.as_raw_fd(), buf.as_mut_ptr() as *mut _, buf.len()) };
    }
}

impl AsRawFd for EventFdInterrupter {
    fn as_raw_fd(&self) -> RawFd {
        self.efd.as_raw_fd()
    }
}
