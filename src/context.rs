use crate::config::Config;
use crate::error::{Error, ErrorCode};
use crate::io_context::{Scheduler, Step, StopSignal};

use std::cell::Cell;
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use tracing::{error, warn};

/// Owns the event loop that every primitive built from it runs on.
///
/// A `Context` is neither `Send` nor `Sync`. Pump it from the thread that
/// created it; use [`StopHandle`] to stop it from elsewhere.
///
/// # Examples
///
/// ```
/// use syncnet::Context;
///
/// let ctx = Context::new();
/// ctx.stop();
/// assert!(ctx.stop_requested());
/// assert!(ctx.run().ok());
/// ```
pub struct Context {
    cfg: Cell<Config>,
    sched: Option<Rc<Scheduler>>,
    stop: Arc<StopSignal>,
}

impl Context {
    pub fn new() -> Context {
        Self::with_config(Config::default())
    }

    pub fn with_config(cfg: Config) -> Context {
        match Scheduler::new() {
            Ok(sched) => {
                let stop = sched.stop_signal().clone();
                Context {
                    cfg: Cell::new(cfg),
                    sched: Some(Rc::new(sched)),
                    stop,
                }
            }
            Err(err) => {
                error!(%err, "failed to create the event loop");
                Context {
                    cfg: Cell::new(cfg),
                    sched: None,
                    stop: Arc::new(StopSignal::detached()),
                }
            }
        }
    }

    pub fn config(&self) -> Config {
        self.cfg.get()
    }

    pub fn set_config(&self, cfg: Config) {
        self.cfg.set(cfg)
    }

    /// Drives detached work until none remains or a stop is requested.
    pub fn run(&self) -> Error {
        let Some(sched) = &self.sched else {
            return ErrorCode::InvalidState.into();
        };
        while !sched.stopped() && sched.has_tasks() {
            if let Err(err) = sched.run_one(None) {
                error!(%err, "reactor failed");
                return ErrorCode::Unknown.into();
            }
        }
        if sched.take_panicked() {
            return ErrorCode::Unknown.into();
        }
        Error::NONE
    }

    /// Performs a single scheduler step.
    pub fn run_one(&self) -> Error {
        let Some(sched) = &self.sched else {
            return ErrorCode::InvalidState.into();
        };
        if sched.stopped() {
            return Error::NONE;
        }
        match sched.run_one(None) {
            Ok(Step::Polled) if sched.take_panicked() => ErrorCode::Unknown.into(),
            Ok(_) => Error::NONE,
            Err(err) => {
                error!(%err, "reactor failed");
                ErrorCode::Unknown.into()
            }
        }
    }

    pub fn stop(&self) {
        self.stop.stop()
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.requested()
    }

    /// Clears a previous stop so the context can be run again.
    pub fn restart(&self) {
        self.stop.restart()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stop: self.stop.clone(),
        }
    }

    pub fn get_executor(&self) -> Executor {
        Executor {
            sched: self.sched.as_ref().map(Rc::downgrade).unwrap_or_default(),
        }
    }

    pub(crate) fn native_handle(&self) -> Option<&Rc<Scheduler>> {
        self.sched.as_ref()
    }

    pub(crate) fn tracing(&self) -> bool {
        self.cfg.get().enable_tracing
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.cfg.get())
            .field("initialized", &self.sched.is_some())
            .field("stop_requested", &self.stop_requested())
            .finish()
    }
}

/// Non-owning reference to a [`Context`]'s scheduler.
#[derive(Clone, Default)]
pub struct Executor {
    sched: Weak<Scheduler>,
}

impl Executor {
    pub fn valid(&self) -> bool {
        self.sched.strong_count() > 0
    }

    /// Submits detached work. It runs while the owning context is pumped.
    pub fn spawn<F>(&self, future: F) -> Error
    where
        F: Future<Output = ()> + 'static,
    {
        match self.sched.upgrade() {
            Some(sched) => {
                sched.spawn(future);
                Error::NONE
            }
            None => {
                warn!("spawn on an executor whose context is gone");
                ErrorCode::NotInitialized.into()
            }
        }
    }

    pub(crate) fn upgrade(&self) -> Option<Rc<Scheduler>> {
        self.sched.upgrade()
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Executor").field("valid", &self.valid()).finish()
    }
}

/// Stops a [`Context`] from any thread.
#[derive(Clone)]
pub struct StopHandle {
    stop: Arc<StopSignal>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.stop.stop()
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.requested()
    }
}

impl fmt::Debug for StopHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("StopHandle")
            .field("stop_requested", &self.stop_requested())
            .finish()
    }
}
