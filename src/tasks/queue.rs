//! Background task queue

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, SendError, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use super::{run_task, Task};

/// Single-worker FIFO executor
///
/// ## Concurrency:
/// - `worker`: the queue lock. `submit` holds it only to start the worker
///   and enqueue, so enqueue order is lock acquisition order.
/// - The channel is unbounded: `submit` never blocks on a busy worker.
/// - Tasks run one at a time, in submission order, never interrupted.
pub struct TaskQueue {
    name: String,
    worker: Mutex<Option<Worker>>,
    completed: Arc<AtomicU64>,
}

struct Worker {
    sender: Sender<Task>,
    handle: JoinHandle<()>,
}

impl TaskQueue {
    /// Create a queue; no thread is started until the first `submit`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            worker: Mutex::new(None),
            completed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Append `task` to the tail of the queue
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_boxed(Box::new(task));
    }

    pub fn submit_boxed(&self, task: Task) {
        let mut worker = self.worker.lock();

        let task = match worker.as_ref() {
            Some(running) => match running.sender.send(task) {
                Ok(()) => return,
                Err(SendError(task)) => {
                    warn!(queue = %self.name, "worker exited unexpectedly, restarting");
                    task
                }
            },
            None => task,
        };

        match Worker::spawn(&self.name, Arc::clone(&self.completed)) {
            Ok(started) => {
                if let Err(SendError(task)) = started.sender.send(task) {
                    run_task(&self.name, task);
                }
                *worker = Some(started);
            }
            Err(e) => {
                // Nothing is queued behind this task, so running it here
                // keeps submission order.
                error!(queue = %self.name, error = %e, "failed to start worker, running task inline");
                drop(worker);
                run_task(&self.name, task);
            }
        }
    }

    /// Stop the worker after it drains every queued task
    ///
    /// Idempotent. A later `submit` starts a fresh worker. Called from the
    /// worker itself, the worker is detached instead of joined.
    pub fn shutdown(&self) {
        let Some(Worker { sender, handle }) = self.worker.lock().take() else {
            return;
        };
        drop(sender);

        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            error!(queue = %self.name, "worker thread panicked");
        }
        debug!(queue = %self.name, "worker stopped");
    }

    /// Whether a worker thread has been started and not shut down
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Tasks waiting behind the one currently running
    pub fn pending(&self) -> usize {
        self.worker
            .lock()
            .as_ref()
            .map_or(0, |worker| worker.sender.len())
    }

    /// Tasks run to completion since the queue was created
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Worker {
    fn spawn(name: &str, completed: Arc<AtomicU64>) -> std::io::Result<Self> {
        let (sender, receiver) = channel::unbounded::<Task>();
        let queue = name.to_string();

        let handle = thread::Builder::new()
            .name(format!("{name}-worker"))
            .spawn(move || {
                debug!(queue = %queue, "worker started");
                for task in receiver.iter() {
                    run_task(&queue, task);
                    completed.fetch_add(1, Ordering::Release);
                }
            })?;

        Ok(Self { sender, handle })
    }
}
