//! Event-loop thread
//!
//! One dedicated OS thread runs a current-thread tokio runtime: every async
//! completion (connect, start, join, publish acks, leave, stop) executes
//! there, serialized, in I/O completion order. `block_on` parks on a
//! [`Notify`] so the loop stays alive through idle periods - the pending
//! shutdown future is the keep-alive work guard - and exits only when
//! [`ReactorHandle::request_stop`] fires.

use std::future::Future;
use std::sync::Arc;
use std::thread;

use thiserror::Error;
use tokio::runtime::Builder;
use tokio::sync::{oneshot, Notify};
use tracing::debug;

/// The event loop went away before the submitted operation completed, or the
/// operation panicked on the event-loop thread.
#[derive(Debug, Clone, Error)]
#[error("event loop unavailable before the operation completed")]
pub struct ReactorGone;

/// Clonable handle for submitting work to the event-loop thread
#[derive(Clone)]
pub(crate) struct ReactorHandle {
    runtime: tokio::runtime::Handle,
    shutdown: Arc<Notify>,
}

impl ReactorHandle {
    /// Fire-and-forget a future onto the event-loop thread.
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.runtime.spawn(fut);
    }

    /// Run a future on the event-loop thread and block the calling thread
    /// for its result. Used by the connect thread so that every completion
    /// still executes on the event loop.
    ///
    /// A panic inside `fut` drops the result channel and comes back as
    /// [`ReactorGone`]; the panic itself is reported by the runtime.
    pub fn run_on<F, T>(&self, fut: F) -> Result<T, ReactorGone>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.runtime.spawn(async move {
            let _ = tx.send(fut.await);
        });
        rx.blocking_recv().map_err(|_| ReactorGone)
    }

    /// Ask the event loop to exit once current completions have run.
    /// Safe to call before the loop is parked; the permit is stored.
    pub fn request_stop(&self) {
        self.shutdown.notify_one();
    }
}

/// Spawn the event-loop thread. `on_exit` runs on the loop thread right
/// before it terminates (the manager flips its `running` flag there).
pub(crate) fn spawn_reactor(
    on_exit: impl FnOnce() + Send + 'static,
) -> std::io::Result<(ReactorHandle, thread::JoinHandle<()>)> {
    let runtime = Builder::new_current_thread().enable_all().build()?;
    let shutdown = Arc::new(Notify::new());

    let handle = ReactorHandle {
        runtime: runtime.handle().clone(),
        shutdown: Arc::clone(&shutdown),
    };

    let thread = thread::Builder::new()
        .name("wamplink-reactor".to_string())
        .spawn(move || {
            debug!("event loop running");
            runtime.block_on(async {
                shutdown.notified().await;
            });
            debug!("event loop stopped");
            on_exit();
        })?;

    Ok((handle, thread))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn run_on_executes_on_the_loop_thread() {
        let (handle, thread) = spawn_reactor(|| {}).unwrap();

        let value = handle
            .run_on(async { std::thread::current().name().map(str::to_string) })
            .unwrap();
        assert_eq!(value.as_deref(), Some("wamplink-reactor"));

        handle.request_stop();
        thread.join().unwrap();
    }

    #[test]
    fn stop_before_park_is_not_lost() {
        let exited = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&exited);
        let (handle, thread) = spawn_reactor(move || flag.store(true, Ordering::SeqCst)).unwrap();

        handle.request_stop();
        thread.join().unwrap();
        assert!(exited.load(Ordering::SeqCst));
    }

    #[test]
    fn loop_survives_idle_periods() {
        let (handle, thread) = spawn_reactor(|| {}).unwrap();

        handle.run_on(async {}).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        // Still serving work after doing nothing for a while.
        assert_eq!(handle.run_on(async { 7 }).unwrap(), 7);

        handle.request_stop();
        thread.join().unwrap();
    }

    #[test]
    fn panicking_operation_reports_reactor_gone() {
        let (handle, thread) = spawn_reactor(|| {}).unwrap();

        let result: Result<(), ReactorGone> = handle.run_on(async { panic!("boom") });
        assert!(result.is_err());
        // The loop itself survives a panicking task.
        assert_eq!(handle.run_on(async { 1 }).unwrap(), 1);

        handle.request_stop();
        thread.join().unwrap();
    }
}
