use super::Interrupter;

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::Wake;

pub type TaskId = usize;

/// Ids of tasks waiting to be polled. Wakers may push from any thread.
pub struct ReadyQueue {
    ids: Mutex<VecDeque<TaskId>>,
    parked: AtomicBool,
    intr: Arc<Interrupter>,
}

impl ReadyQueue {
    pub fn new(intr: Arc<Interrupter>) -> Self {
        ReadyQueue {
            ids: Mutex::default(),
            parked: AtomicBool::new(false),
            intr,
        }
    }

    pub fn push(&self, id: TaskId) {
        if let Ok(mut ids) = self.ids.lock() {
            ids.push_back(id);
        }
        if self.parked.load(Ordering::SeqCst) {
            let _ = self.intr.interrupt();
        }
    }

    pub fn pop(&self) -> Option<TaskId> {
        self.ids.lock().ok()?.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.lock().map(|ids| ids.is_empty()).unwrap_or(true)
    }

    pub fn set_parked(&self, parked: bool) {
        self.parked.store(parked, Ordering::SeqCst)
    }
}

pub struct TaskWaker {
    id: TaskId,
    scheduled: AtomicBool,
    queue: Arc<ReadyQueue>,
}

impl TaskWaker {
    pub fn new(id: TaskId, queue: Arc<ReadyQueue>) -> Arc<Self> {
        Arc::new(TaskWaker {
            id,
            scheduled: AtomicBool::new(false),
            queue,
        })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Queues the task unless it is already queued.
    pub fn schedule(&self) {
        if !self.scheduled.swap(true, Ordering::AcqRel) {
            self.queue.push(self.id);
        }
    }

    pub fn unschedule(&self) {
        self.scheduled.store(false, Ordering::Release)
    }
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.schedule()
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.schedule()
    }
}

/// A detached unit of work owned by the scheduler.
pub struct Task {
    pub future: Pin<Box<dyn Future<Output = ()>>>,
    pub waker: Arc<TaskWaker>,
}
