//! The owner-thread executor: a FIFO task queue bound to exactly one thread.
//!
//! All element-tree access goes through [`OwnerExecutor::execute`], which
//! marshals the unit of work onto the owner thread and blocks the caller
//! until it has run to completion or failed. The owner thread never blocks
//! on caller threads; callers only ever block on their own task's completion
//! signal.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, TryRecvError};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle, ThreadId};

use crate::result::{SondearError, SondearResult};

type Task = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct TaskQueue {
    tasks: VecDeque<Task>,
    shutdown: bool,
}

struct Shared {
    queue: Mutex<TaskQueue>,
    available: Condvar,
}

/// FIFO executor bound to a single owner thread.
///
/// Work submitted from any thread executes in submission order on the owner
/// thread. Work submitted *from* the owner thread is still queued, never run
/// inline, so it cannot jump ahead of already-queued work; the submitting
/// call then drains the queue until its own task has completed.
pub struct OwnerExecutor {
    shared: Arc<Shared>,
    owner: ThreadId,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl OwnerExecutor {
    /// Spawn a dedicated owner thread and return the executor bound to it
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(TaskQueue::default()),
            available: Condvar::new(),
        });
        let loop_shared = Arc::clone(&shared);
        let join = thread::Builder::new()
            .name(name.into())
            .spawn(move || owner_loop(&loop_shared))
            .expect("failed to spawn owner thread");
        let owner = join.thread().id();
        Self {
            shared,
            owner,
            join: Mutex::new(Some(join)),
        }
    }

    /// Whether the calling thread is the owner thread
    #[must_use]
    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Fail with [`SondearError::WrongThread`] unless called on the owner
    /// thread.
    pub fn check_owner_thread(&self, operation: &str) -> SondearResult<()> {
        if self.is_owner_thread() {
            Ok(())
        } else {
            Err(SondearError::WrongThread {
                operation: operation.to_string(),
                thread: current_thread_name(),
            })
        }
    }

    /// Enqueue fire-and-forget work on the owner thread.
    ///
    /// This is how external collaborators (animations, layout passes, test
    /// fixtures) model pending owner-thread work that idle detection must
    /// drain before queries are trustworthy.
    pub fn post(&self, work: impl FnOnce() + Send + 'static) -> SondearResult<()> {
        self.enqueue(Box::new(work))
    }

    /// Run `work` on the owner thread and block until it completes.
    ///
    /// Failures inside the work, including panics, are captured and returned
    /// on the calling thread. A caller whose completion signal disconnects
    /// (the owner thread is gone) fails with `OwnerThreadLost` rather than
    /// silently resuming.
    pub fn execute<R, F>(&self, work: F) -> SondearResult<R>
    where
        F: FnOnce() -> SondearResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel::<SondearResult<R>>(1);
        let task: Task = Box::new(move || {
            let result = catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|payload| {
                Err(SondearError::TaskPanicked {
                    message: panic_message(payload.as_ref()),
                })
            });
            let _ = tx.send(result);
        });
        self.enqueue(task)?;

        if self.is_owner_thread() {
            // Already on the owner thread: drain the queue in FIFO order
            // until our own task has produced a result.
            loop {
                match rx.try_recv() {
                    Ok(result) => return result,
                    Err(TryRecvError::Empty) => {
                        if !self.run_one_queued() {
                            return Err(SondearError::OwnerThreadLost {
                                context: "draining the owner queue for a nested task".into(),
                            });
                        }
                    }
                    Err(TryRecvError::Disconnected) => {
                        return Err(SondearError::OwnerThreadLost {
                            context: "waiting for a nested task result".into(),
                        })
                    }
                }
            }
        } else {
            rx.recv().unwrap_or_else(|_| {
                Err(SondearError::OwnerThreadLost {
                    context: "waiting for a task result".into(),
                })
            })
        }
    }

    /// Run all currently queued work to completion; owner thread only.
    ///
    /// Returns how many tasks ran, so idle detection can observe whether a
    /// pass made progress. Tasks queued by the drained tasks themselves are
    /// picked up in the same call.
    pub fn drain_pending(&self) -> SondearResult<usize> {
        self.check_owner_thread("drain_pending")?;
        let mut ran = 0;
        while self.run_one_queued() {
            ran += 1;
        }
        Ok(ran)
    }

    /// Whether any work is currently queued
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self
            .shared
            .queue
            .lock()
            .expect("owner queue poisoned")
            .tasks
            .is_empty()
    }

    fn enqueue(&self, task: Task) -> SondearResult<()> {
        let mut queue = self.shared.queue.lock().expect("owner queue poisoned");
        if queue.shutdown {
            return Err(SondearError::OwnerThreadLost {
                context: "submitting work to a stopped executor".into(),
            });
        }
        queue.tasks.push_back(task);
        drop(queue);
        self.shared.available.notify_one();
        Ok(())
    }

    /// Pop and run the task at the head of the queue; false when empty.
    fn run_one_queued(&self) -> bool {
        let task = {
            let mut queue = self.shared.queue.lock().expect("owner queue poisoned");
            queue.tasks.pop_front()
        };
        match task {
            Some(task) => {
                run_task(task);
                true
            }
            None => false,
        }
    }
}

impl Drop for OwnerExecutor {
    fn drop(&mut self) {
        {
            let mut queue = self.shared.queue.lock().expect("owner queue poisoned");
            queue.shutdown = true;
        }
        self.shared.available.notify_all();
        let handle = self.join.lock().expect("join handle poisoned").take();
        if let Some(handle) = handle {
            if thread::current().id() != self.owner {
                let _ = handle.join();
            }
        }
    }
}

impl std::fmt::Debug for OwnerExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerExecutor")
            .field("owner", &self.owner)
            .field("pending", &self.has_pending())
            .finish()
    }
}

fn owner_loop(shared: &Shared) {
    loop {
        let task = {
            let mut queue = shared.queue.lock().expect("owner queue poisoned");
            loop {
                if let Some(task) = queue.tasks.pop_front() {
                    break Some(task);
                }
                if queue.shutdown {
                    break None;
                }
                queue = shared
                    .available
                    .wait(queue)
                    .expect("owner queue poisoned");
            }
        };
        match task {
            Some(task) => run_task(task),
            None => return,
        }
    }
}

/// Run one task, keeping the owner loop alive across panics. Tasks submitted
/// through [`OwnerExecutor::execute`] report their own panics to the caller;
/// this guard covers fire-and-forget posts.
fn run_task(task: Task) {
    if catch_unwind(AssertUnwindSafe(task)).is_err() {
        tracing::error!("a posted task panicked on the owner thread");
    }
}

fn current_thread_name() -> String {
    let current = thread::current();
    current
        .name()
        .map_or_else(|| format!("{:?}", current.id()), ToString::to_string)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload.downcast_ref::<&str>().map_or_else(
        || {
            payload
                .downcast_ref::<String>()
                .cloned()
                .unwrap_or_else(|| "non-string panic payload".to_string())
        },
        ToString::to_string,
    )
}
