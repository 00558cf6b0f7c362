//! Task launcher: runs a unit of work on its own named OS thread.
//!
//! Every long-running activity of the daemon (dispatch loop, input and output
//! pumps, each timer job) goes through [`launch_named`].  Launches are
//! fire-and-forget by default: the returned [`TaskHandle`] may simply be
//! dropped, and the thread keeps running detached.  Process exit never waits
//! for launched threads.
//!
//! # Failure isolation
//!
//! The closure runs under [`report::catch_panic`].  A panic never escapes the task's
//! thread: it is logged at `error` level immediately (so unjoined failures are
//! still observable) and stored in the handle, where a later
//! [`TaskHandle::join`] surfaces it as [`LaunchError::Panicked`].

use std::sync::mpsc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use tracing::{error, trace};

use crate::core::error::LaunchError;
use crate::runtime::report;

/// Handle to a launched task.  Dropping it detaches the task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    name: String,
    thread_id: ThreadId,
    result_rx: mpsc::Receiver<Result<T, LaunchError>>,
}

impl<T> TaskHandle<T> {
    /// Diagnostic name of the underlying thread.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Block until the task finishes and return its result.
    pub fn join(self) -> Result<T, LaunchError> {
        match self.result_rx.recv() {
            Ok(result) => result,
            Err(mpsc::RecvError) => Err(LaunchError::Detached { name: self.name }),
        }
    }

    /// Wait at most `timeout` for the task.
    ///
    /// On [`LaunchError::Timeout`] the task is still running and the call
    /// may be retried.  Once a result has been returned, further calls yield
    /// [`LaunchError::Detached`].
    pub fn join_timeout(&self, timeout: Duration) -> Result<T, LaunchError> {
        match self.result_rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(LaunchError::Timeout {
                name: self.name.clone(),
                timeout,
            }),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(LaunchError::Detached {
                name: self.name.clone(),
            }),
        }
    }
}

/// Launch `f` on a new thread named after the closure's type.
pub fn launch<F, T>(f: F) -> Result<TaskHandle<T>, LaunchError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    launch_named(short_type_name::<F>(), f)
}

/// Launch `f` on a new thread with an explicit diagnostic name.
pub fn launch_named<F, T>(name: impl Into<String>, f: F) -> Result<TaskHandle<T>, LaunchError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let name = name.into();
    let (result_tx, result_rx) = mpsc::sync_channel(1);
    let task_name = name.clone();

    let join = thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            trace!(task = %task_name, "task started");
            let result = report::catch_panic(f).map_err(|payload| {
                error!(task = %task_name, "{}", report::describe_panic(payload.as_ref()));
                LaunchError::Panicked {
                    name: task_name.clone(),
                    message: report::panic_message(payload.as_ref()),
                }
            });
            trace!(task = %task_name, ok = result.is_ok(), "task finished");
            // The joiner may have dropped its handle; that is a detach, not an error.
            let _ = result_tx.send(result);
        })
        .map_err(|source| LaunchError::Spawn { name: name.clone(), source })?;

    Ok(TaskHandle {
        name,
        thread_id: join.thread().id(),
        result_rx,
    })
}

/// `botd::agent::Agent<T>::start::{{closure}}` → `Agent<T>::start::{{closure}}`.
///
/// Linux truncates thread names to 15 bytes, so keep the informative tail.
fn short_type_name<F>() -> String {
    let full = std::any::type_name::<F>();
    let path = full.split('<').next().unwrap_or(full);
    let keep_from = path
        .rmatch_indices("::")
        .map(|(i, _)| i)
        .nth(2)
        .map_or(0, |i| i + 2);
    full[keep_from..].to_string()
}
