//! Per-tab worker threads.
//!
//! [HTML § 8.1.7 Event loops](https://html.spec.whatwg.org/multipage/webappapis.html#event-loops)
//!
//! "An event loop has one or more task queues. A task queue is a set of
//! tasks."
//!
//! Each tab owns one [`TaskRunner`]: a named thread that owns the tab state
//! and runs queued closures against it one at a time, in submission order.
//! Other threads talk to the tab only through its [`TaskQueue`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use crate::error::BrowserError;

/// A unit of work run on the owning thread with exclusive access to `S`.
pub type Task<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

struct QueueState<S> {
    tasks: VecDeque<Task<S>>,
    quit: bool,
}

struct Shared<S> {
    state: Mutex<QueueState<S>>,
    available: Condvar,
}

/// Handle for submitting tasks to a [`TaskRunner`]. Cheap to clone.
pub struct TaskQueue<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for TaskQueue<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S> std::fmt::Debug for TaskQueue<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("TaskQueue")
            .field("pending", &state.tasks.len())
            .field("quit", &state.quit)
            .finish()
    }
}

impl<S> TaskQueue<S> {
    fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    tasks: VecDeque::new(),
                    quit: false,
                }),
                available: Condvar::new(),
            }),
        }
    }

    /// Append a task. Tasks run in the order they were scheduled.
    ///
    /// Tasks scheduled after the runner quit are dropped unrun.
    pub fn schedule_task(&self, task: impl FnOnce(&mut S) + Send + 'static) {
        let mut state = self.shared.state.lock();
        if state.quit {
            return;
        }
        state.tasks.push_back(Box::new(task));
        let _ = self.shared.available.notify_one();
    }

    /// Drop every task that has not started yet.
    pub fn clear_pending_tasks(&self) {
        self.shared.state.lock().tasks.clear();
    }

    /// Number of tasks waiting to run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.state.lock().tasks.len()
    }

    fn set_quit(&self) {
        let mut state = self.shared.state.lock();
        state.quit = true;
        state.tasks.clear();
        let _ = self.shared.available.notify_all();
    }

    /// Block until a task is available; `None` once quit is set.
    fn next(&self) -> Option<Task<S>> {
        let mut state = self.shared.state.lock();
        loop {
            if state.quit {
                return None;
            }
            if let Some(task) = state.tasks.pop_front() {
                return Some(task);
            }
            self.shared.available.wait(&mut state);
        }
    }
}

/// A worker thread that owns a value of type `S` and runs tasks against it.
pub struct TaskRunner<S> {
    queue: TaskQueue<S>,
    handle: Option<JoinHandle<()>>,
}

impl<S> std::fmt::Debug for TaskRunner<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("queue", &self.queue)
            .field("running", &self.handle.is_some())
            .finish()
    }
}

impl<S: 'static> TaskRunner<S> {
    /// Start a thread named `name`. `init` builds the state on the new
    /// thread, so `S` itself does not have to be `Send`.
    ///
    /// # Errors
    ///
    /// Returns [`BrowserError::Spawn`] if the OS refuses to create the
    /// thread.
    pub fn spawn(
        name: &str,
        init: impl FnOnce(TaskQueue<S>) -> S + Send + 'static,
    ) -> Result<Self, BrowserError> {
        let queue = TaskQueue::new();
        let worker_queue = queue.clone();
        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let mut state = init(worker_queue.clone());
                let mut ran = 0_u64;
                while let Some(task) = worker_queue.next() {
                    task(&mut state);
                    ran += 1;
                }
                log::trace!(target: "kestrel::task", "{thread_name} exiting after {ran} tasks");
            })?;
        Ok(Self {
            queue,
            handle: Some(handle),
        })
    }

    /// The submission handle.
    #[must_use]
    pub const fn queue(&self) -> &TaskQueue<S> {
        &self.queue
    }

    /// Schedule a task on this runner.
    pub fn schedule_task(&self, task: impl FnOnce(&mut S) + Send + 'static) {
        self.queue.schedule_task(task);
    }

    /// Stop after the running task finishes, drop pending tasks and join.
    pub fn quit(&mut self) {
        self.queue.set_quit();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log::warn!(target: "kestrel::task", "task thread panicked");
        }
    }
}

impl<S> Drop for TaskRunner<S> {
    fn drop(&mut self) {
        self.queue.set_quit();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_tasks_run_in_fifo_order() {
        let runner = TaskRunner::spawn("fifo", |_| Vec::new()).unwrap();
        for i in 0..100 {
            runner.schedule_task(move |log: &mut Vec<i32>| log.push(i));
        }
        let (tx, rx) = mpsc::channel();
        runner.schedule_task(move |log: &mut Vec<i32>| tx.send(log.clone()).unwrap());
        let log = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(log, (0..100).collect::<Vec<_>>());
    }

    struct Counter {
        queue: TaskQueue<Counter>,
        count: i32,
    }

    #[test]
    fn test_task_can_schedule_followup() {
        let (tx, rx) = mpsc::channel();
        let runner = TaskRunner::spawn("followup", |queue| Counter { queue, count: 0 }).unwrap();
        runner.schedule_task(move |counter: &mut Counter| {
            counter.count += 1;
            counter.queue.schedule_task(move |counter: &mut Counter| {
                counter.count += 1;
                tx.send(counter.count).unwrap();
            });
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 2);
    }

    #[test]
    fn test_quit_drops_pending_and_joins() {
        let mut runner = TaskRunner::spawn("quit", |_| ()).unwrap();
        let queue = runner.queue().clone();
        runner.quit();
        queue.schedule_task(|_| panic!("must not run"));
        assert_eq!(queue.pending(), 0);
    }
}
