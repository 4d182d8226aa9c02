//! Tasks Module
//!
//! Deferred work for the host engine, independent of file I/O.
//!
//! ## Responsibilities
//! - `TaskQueue`: unbounded FIFO drained by exactly one worker thread
//! - `spawn_detached`: fire-and-forget threads outside the queue
//!
//! ## Worker Lifecycle
//! ```text
//!   first submit ──► spawn worker ──► recv ─► run ─► recv ─► ...
//!                                      │
//!   shutdown ──► drop sender ──────────┴─► drain remaining ─► exit ─► join
//! ```

mod queue;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use tracing::error;

pub use queue::TaskQueue;

/// A unit of deferred work
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Run `task` on a new thread that nobody joins
///
/// A panic inside the task is logged and contained to that thread.
pub fn spawn_detached<F>(task: F)
where
    F: FnOnce() + Send + 'static,
{
    let spawned = thread::Builder::new()
        .name("bandstore-detached".to_string())
        .spawn(move || run_task("detached", Box::new(task)));

    if let Err(e) = spawned {
        error!(error = %e, "failed to spawn detached thread");
    }
}

/// Run a task to completion, containing any panic
pub(crate) fn run_task(context: &str, task: Task) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
        error!(
            context,
            panic = panic_message(&*payload),
            "background task panicked"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
