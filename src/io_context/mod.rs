//! Single-threaded event loop: a task table, a ready queue and an epoll
//! reactor. One call to [`Scheduler::run_one`] performs one step.

mod eventfd;
pub use self::eventfd::EventFdInterrupter as Interrupter;

mod epoll;
pub use self::epoll::{Direction, EpollReactor as Reactor, IoState};

mod task;
use self::task::{ReadyQueue, Task, TaskId, TaskWaker};

mod socket_impl;
pub use self::socket_impl::SocketImpl;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Poll, Waker};

use tracing::warn;

/// Stop flag shared between the loop and [`StopHandle`](crate::StopHandle)s.
pub struct StopSignal {
    requested: AtomicBool,
    intr: Option<Arc<Interrupter>>,
}

impl StopSignal {
    /// A signal with no loop behind it. Reads as permanently stopped.
    pub fn detached() -> Self {
        StopSignal {
            requested: AtomicBool::new(true),
            intr: None,
        }
    }

    pub fn stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
        if let Some(intr) = &self.intr {
            let _ = intr.interrupt();
        }
    }

    pub fn restart(&self) {
        if self.intr.is_some() {
            self.requested.store(false, Ordering::SeqCst);
        }
    }

    pub fn requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// What a single step did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// One task was polled.
    Polled,
    /// Blocked in the reactor and dispatched readiness.
    Waited,
    /// Nothing to poll and nothing to wait for.
    Idle,
}

/// A future owned by the caller's stack frame and driven by the scheduler
/// next to the detached tasks.
pub struct Root<'a> {
    waker: Arc<TaskWaker>,
    future: Pin<&'a mut (dyn Future<Output = ()> + 'a)>,
    panicked: bool,
}

impl<'a> Root<'a> {
    pub fn new(sched: &Scheduler, future: Pin<&'a mut (dyn Future<Output = ()> + 'a)>) -> Self {
        let waker = TaskWaker::new(sched.next_id(), sched.queue.clone());
        waker.schedule();
        Root {
            waker,
            future,
            panicked: false,
        }
    }

    pub fn panicked(&self) -> bool {
        self.panicked
    }

    fn poll(&mut self) {
        if self.panicked {
            return;
        }
        self.waker.unschedule();
        let waker = Waker::from(self.waker.clone());
        let mut cx = std::task::Context::from_waker(&waker);
        let future = &mut self.future;
        if panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx))).is_err() {
            self.panicked = true;
        }
    }
}

pub struct Scheduler {
    reactor: Reactor,
    queue: Arc<ReadyQueue>,
    tasks: RefCell<HashMap<TaskId, Task>>,
    next_id: Cell<TaskId>,
    stop: Arc<StopSignal>,
    panicked: Cell<bool>,
}

impl Scheduler {
    pub fn new() -> io::Result<Self> {
        let intr = Arc::new(Interrupter::new()?);
        Ok(Scheduler {
            reactor: Reactor::new(intr.clone())?,
            queue: Arc::new(ReadyQueue::new(intr.clone())),
            tasks: RefCell::default(),
            next_id: Cell::new(0),
            stop: Arc::new(StopSignal {
                requested: AtomicBool::new(false),
                intr: Some(intr),
            }),
            panicked: Cell::new(false),
        })
    }

    pub fn reactor(&self) -> &Reactor {
        &self.reactor
    }

    pub fn stop_signal(&self) -> &Arc<StopSignal> {
        &self.stop
    }

    pub fn stopped(&self) -> bool {
        self.stop.requested()
    }

    fn next_id(&self) -> TaskId {
        let id = self.next_id.get();
        self.next_id.set(id.wrapping_add(1));
        id
    }

    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + 'static,
    {
        let id = self.next_id();
        let waker = TaskWaker::new(id, self.queue.clone());
        self.tasks.borrow_mut().insert(
            id,
            Task {
                future: Box::pin(future),
                waker: waker.clone(),
            },
        );
        waker.schedule();
    }

    pub fn has_tasks(&self) -> bool {
        !self.tasks.borrow().is_empty()
    }

    /// Returns and clears whether a detached task panicked since the last call.
    pub fn take_panicked(&self) -> bool {
        self.panicked.replace(false)
    }

    /// Polls one ready task, or blocks in the reactor when none is ready.
    pub fn run_one(&self, root: Option<&mut Root<'_>>) -> io::Result<Step> {
        if let Some(id) = self.queue.pop() {
            match root {
                Some(root) if root.waker.id() == id => root.poll(),
                _ => self.poll_task(id),
            }
            return Ok(Step::Polled);
        }

        if root.is_none() && !self.has_tasks() {
            return Ok(Step::Idle);
        }

        let mut events = Reactor::event_buffer();
        self.queue.set_parked(true);
        let res = if self.queue.is_empty() && !self.stopped() {
            self.reactor.wait(None, &mut events)
        } else {
            Ok(0)
        };
        self.queue.set_parked(false);
        let n = res?;
        self.reactor.dispatch(&events[..n]);
        Ok(Step::Waited)
    }

    fn poll_task(&self, id: TaskId) {
        // Stale wakeups for finished tasks land here too.
        let Some(mut task) = self.tasks.borrow_mut().remove(&id) else {
            return;
        };
        task.waker.unschedule();
        let waker = Waker::from(task.waker.clone());
        let mut cx = std::task::Context::from_waker(&waker);
        let future = &mut task.future;
        match panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx))) {
            Ok(Poll::Pending) => {
                self.tasks.borrow_mut().insert(id, task);
            }
            Ok(Poll::Ready(())) => {}
            Err(_) => {
                warn!(task = id, "detached task panicked");
                self.panicked.set(true);
            }
        }
    }
}
