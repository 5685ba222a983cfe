//! Runs one unit of work to completion on the calling thread.

use crate::context::Context;
use crate::error::{map_io_error, Error, ErrorCode};
use crate::io_context::Root;

use std::cell::Cell;
use std::future::Future;
use std::io;
use std::pin::pin;

use tracing::trace;

/// Normalises the result shapes produced by the backends.
pub(crate) trait IoOutcome {
    /// `ErrorCode::None` on success, otherwise the mapped failure.
    fn code(&self, fallback: ErrorCode) -> ErrorCode;

    fn bytes(&self) -> usize {
        0
    }
}

impl IoOutcome for io::Result<usize> {
    fn code(&self, fallback: ErrorCode) -> ErrorCode {
        match self {
            Ok(_) => ErrorCode::None,
            Err(err) => map_io_error(err, fallback),
        }
    }

    fn bytes(&self) -> usize {
        *self.as_ref().unwrap_or(&0)
    }
}

impl IoOutcome for io::Result<()> {
    fn code(&self, fallback: ErrorCode) -> ErrorCode {
        match self {
            Ok(()) => ErrorCode::None,
            Err(err) => map_io_error(err, fallback),
        }
    }
}

#[cfg(feature = "tls")]
fn ssl_code(err: &openssl::ssl::Error, fallback: ErrorCode) -> ErrorCode {
    match err.io_error() {
        Some(err) => map_io_error(err, fallback),
        None => fallback,
    }
}

#[cfg(feature = "tls")]
impl IoOutcome for Result<usize, openssl::ssl::Error> {
    fn code(&self, fallback: ErrorCode) -> ErrorCode {
        match self {
            Ok(_) => ErrorCode::None,
            Err(err) => ssl_code(err, fallback),
        }
    }

    fn bytes(&self) -> usize {
        *self.as_ref().unwrap_or(&0)
    }
}

#[cfg(feature = "tls")]
impl IoOutcome for Result<(), openssl::ssl::Error> {
    fn code(&self, fallback: ErrorCode) -> ErrorCode {
        match self {
            Ok(()) => ErrorCode::None,
            Err(err) => ssl_code(err, fallback),
        }
    }
}

/// Folds a bridge outcome into one `Error`.
pub(crate) fn outcome_error<R: IoOutcome>(res: Result<R, Error>, fallback: ErrorCode) -> Error {
    match res {
        Ok(out) => Error::new(out.code(fallback)),
        Err(err) => err,
    }
}

/// Submits `work` as the scheduler's root task and pumps the scheduler on the
/// calling thread until it completes.
///
/// `Err` means the work could not run to completion: the context is not
/// initialized, a stop was requested, the reactor failed or the work panicked.
pub(crate) fn block_on<F: Future>(ctx: &Context, op: &'static str, work: F) -> Result<F::Output, Error> {
    let Some(sched) = ctx.get_executor().upgrade() else {
        return Err(ErrorCode::NotInitialized.into());
    };
    let tracing = ctx.tracing();
    if sched.stopped() {
        if tracing {
            trace!(op, "stopped before submission");
        }
        return Err(ErrorCode::Unknown.into());
    }

    let done = Cell::new(false);
    let slot = Cell::new(None);
    let unit = {
        let (done, slot) = (&done, &slot);
        async move {
            slot.set(Some(work.await));
            done.set(true);
        }
    };
    let unit = pin!(unit);
    let mut root = Root::new(&sched, unit);
    if tracing {
        trace!(op, "submitted");
    }

    while !done.get() {
        if root.panicked() {
            if tracing {
                trace!(op, "unit of work panicked");
            }
            return Err(ErrorCode::Unknown.into());
        }
        if sched.stopped() {
            if tracing {
                trace!(op, "abandoned on stop");
            }
            return Err(ErrorCode::Unknown.into());
        }
        if let Err(err) = sched.run_one(Some(&mut root)) {
            if tracing {
                trace!(op, %err, "reactor failed");
            }
            return Err(ErrorCode::Unknown.into());
        }
    }
    drop(root);

    let out = slot.take().ok_or(Error::new(ErrorCode::Unknown));
    if tracing {
        trace!(op, ok = out.is_ok(), "completed");
    }
    out
}
