//! Deferred execution for cache flushes.
//!
//! A [`Scheduler`] runs a task on a later turn than the one that requested it.
//! [`TurnQueue`] is driven explicitly by the host's event loop; [`DebounceScheduler`]
//! runs tasks on a tokio runtime after a short delay.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;

/// Default delay before a debounced task runs.
pub const DEFAULT_DEBOUNCE_MS: u64 = 10;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks on a later scheduling turn.
pub trait Scheduler: Send + Sync {
    /// Arranges for `task` to run after the current turn completes.
    ///
    /// Implementations must never run the task synchronously inside this call.
    fn defer(&self, task: Task);
}

/// A queue of tasks run one turn at a time by its owner.
#[derive(Default)]
pub struct TurnQueue {
    tasks: Mutex<VecDeque<Task>>,
}

impl TurnQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs every task queued before this call.
    ///
    /// Tasks deferred while the turn is running are left for the next turn.
    /// Returns the number of tasks run.
    pub fn run_turn(&self) -> usize {
        let batch = std::mem::take(&mut *self.tasks.lock());
        let count = batch.len();
        for task in batch {
            task();
        }
        count
    }

    /// Runs turns until the queue is empty.
    pub fn drain(&self) -> usize {
        let mut total = 0;
        loop {
            let ran = self.run_turn();
            if ran == 0 {
                return total;
            }
            total += ran;
        }
    }

    /// Number of tasks waiting for the next turn.
    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl Scheduler for TurnQueue {
    fn defer(&self, task: Task) {
        self.tasks.lock().push_back(task);
    }
}

/// Runs deferred tasks on a tokio runtime after a fixed delay.
pub struct DebounceScheduler {
    handle: Handle,
    delay: Duration,
}

impl DebounceScheduler {
    pub fn new(handle: Handle, delay: Duration) -> Self {
        Self { handle, delay }
    }

    /// Uses the runtime of the calling context, if there is one.
    pub fn current() -> Option<Self> {
        Handle::try_current()
            .ok()
            .map(|handle| Self::new(handle, Duration::from_millis(DEFAULT_DEBOUNCE_MS)))
    }
}

impl Scheduler for DebounceScheduler {
    fn defer(&self, task: Task) {
        let delay = self.delay;
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
    }
}
