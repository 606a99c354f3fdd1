//! Connection manager façade
//!
//! Owns one transport/session pair and the two background threads that drive
//! it: the event-loop thread (see [`crate::reactor`]) and the connect thread
//! (see [`crate::connect`]). Arbitrary caller threads go through the
//! thread-safe façade: `start`, `exec`, `stop`, `join`, `is_running`.
//!
//! Calling `start` while running or `stop` while stopped is a caller bug and
//! panics; environmental failures (router down, handshake errors) never do.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{debug, error, info, warn};
use wamplink_core::{
    Args, LinkEvent, LinkPhase, PhaseChange, RouterSession, SessionFactory, Settings,
};

use crate::connect;
use crate::reactor::{spawn_reactor, ReactorHandle};

/// Host-supplied callback run once per successful join (or dispatched as an
/// `exec` task). Returning `false` means "this session is no longer valid,
/// tear it down".
pub type SetupFn = Box<dyn FnOnce(Arc<dyn RouterSession>) -> bool + Send + 'static>;

const PHASE_TRACE_CAP: usize = 64;

// ----------------------------------------------------------------------------
// Shared link state
// ----------------------------------------------------------------------------

/// State shared between the façade, the connect thread and the event loop
pub(crate) struct Shared {
    /// True from `start()` until the event-loop thread exits
    pub running: AtomicBool,
    /// Compare-and-swap claim on "a start is in flight"; closes the race
    /// where two callers both observe "not running" and both spawn threads
    pub start_gate: AtomicBool,
    /// Sole cancellation signal; polled by the retry loop, cleared only by a
    /// fresh `start()`
    pub stop_pending: AtomicBool,
    /// Claim on running the session teardown, so a `stop()` racing the tail
    /// of the handshake cannot unwind the same session twice
    teardown_claimed: AtomicBool,
    /// Non-None only between join success and stop completion
    pub session: Mutex<Option<Arc<dyn RouterSession>>>,
    phase: Mutex<LinkPhase>,
    trace: Mutex<Vec<PhaseChange>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            start_gate: AtomicBool::new(false),
            stop_pending: AtomicBool::new(false),
            teardown_claimed: AtomicBool::new(false),
            session: Mutex::new(None),
            phase: Mutex::new(LinkPhase::Idle),
            trace: Mutex::new(Vec::new()),
        }
    }

    pub fn stop_pending(&self) -> bool {
        self.stop_pending.load(Ordering::SeqCst)
    }

    /// Wins exactly once per attempt; the winner unwinds the session.
    pub fn claim_teardown(&self) -> bool {
        self.teardown_claimed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn phase(&self) -> LinkPhase {
        self.phase.lock().expect("phase lock poisoned").clone()
    }

    /// Advance the link state machine. An event the machine rejects is a
    /// logic error in the driver; it is logged and the phase kept.
    pub fn advance(&self, event: LinkEvent) {
        let mut phase = self.phase.lock().expect("phase lock poisoned");
        let from = phase.name();
        match phase.clone().apply(event) {
            Ok(next) => {
                debug!(from, to = next.name(), "link phase change");
                let mut trace = self.trace.lock().expect("trace lock poisoned");
                if trace.len() == PHASE_TRACE_CAP {
                    trace.remove(0);
                }
                trace.push(PhaseChange {
                    from,
                    to: next.name(),
                });
                *phase = next;
            }
            Err(err) => error!(%err, "link state machine rejected event"),
        }
    }

    fn reset_for_start(&self) {
        self.stop_pending.store(false, Ordering::SeqCst);
        self.teardown_claimed.store(false, Ordering::SeqCst);
        *self.phase.lock().expect("phase lock poisoned") = LinkPhase::Idle;
        self.trace.lock().expect("trace lock poisoned").clear();
    }
}

struct Threads {
    connect: thread::JoinHandle<()>,
    reactor: thread::JoinHandle<()>,
    handle: ReactorHandle,
}

// ----------------------------------------------------------------------------
// Connection Manager
// ----------------------------------------------------------------------------

/// Maintains exactly one session to the router, surviving router
/// unavailability with a fixed-backoff retry loop and shutting down cleanly
/// on demand.
pub struct ConnectionManager {
    settings: Settings,
    factory: Arc<dyn SessionFactory>,
    shared: Arc<Shared>,
    threads: Mutex<Option<Threads>>,
}

impl ConnectionManager {
    pub fn new(settings: Settings, factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            settings,
            factory,
            shared: Arc::new(Shared::new()),
            threads: Mutex::new(None),
        }
    }

    /// Non-blocking snapshot of whether the link is active.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Current phase of the link state machine.
    pub fn phase(&self) -> LinkPhase {
        self.shared.phase()
    }

    /// Phase changes recorded since the last `start()`, oldest first.
    pub fn phase_trace(&self) -> Vec<PhaseChange> {
        self.shared.trace.lock().expect("trace lock poisoned").clone()
    }

    /// Begin connecting; `setup` runs exactly once on the event-loop thread
    /// after a successful join. Never reports failure to the caller - the
    /// retry loop and logs carry that.
    ///
    /// Panics when the link is already active.
    pub fn start<F>(&self, setup: F)
    where
        F: FnOnce(Arc<dyn RouterSession>) -> bool + Send + 'static,
    {
        assert!(
            self.try_claim(),
            "start() called while the link is already active"
        );
        self.spawn_threads(Box::new(setup));
    }

    /// Run `task` against the live session on the calling thread. With no
    /// start in flight this behaves as `start(task)` (returns true); while
    /// a start is in flight but not yet established the task is skipped and
    /// false returned; otherwise returns the task's own result, triggering
    /// `stop()` when that is false.
    pub fn exec<F>(&self, task: F) -> bool
    where
        F: FnOnce(Arc<dyn RouterSession>) -> bool + Send + 'static,
    {
        if self.try_claim() {
            self.spawn_threads(Box::new(task));
            return true;
        }

        let session = self
            .shared
            .session
            .lock()
            .expect("session lock poisoned")
            .clone();
        match session {
            Some(session) => {
                let ok = task(session);
                if !ok {
                    self.stop();
                }
                ok
            }
            None => {
                warn!("exec skipped: link is starting but not yet established");
                false
            }
        }
    }

    /// Queue a publish on the event-loop thread. Returns false when no
    /// session is established; publish failures are logged, not retried.
    pub fn publish(&self, topic: &str, args: Args) -> bool {
        let session = self
            .shared
            .session
            .lock()
            .expect("session lock poisoned")
            .clone();
        let Some(session) = session else {
            return false;
        };
        let Some(handle) = self.reactor_handle() else {
            return false;
        };
        let topic = topic.to_string();
        handle.spawn(async move {
            if let Err(err) = session.publish(&topic, args).await {
                warn!(%topic, error = %err, "publish failed");
            }
        });
        true
    }

    /// Request shutdown. With a live session, leave/stop are issued on the
    /// event-loop thread and the loop exits once they complete; while still
    /// retrying, the connect thread observes the flag and exits on its own.
    ///
    /// Panics when the link is not running.
    pub fn stop(&self) {
        assert!(self.is_running(), "stop() called while the link is not running");

        self.shared.stop_pending.store(true, Ordering::SeqCst);

        // Until the link is established the connect thread owns the unwind:
        // the retry loop and the handshake tail both poll the flag. Only an
        // established session is torn down from here, and only once.
        if !self.shared.phase().is_established() || !self.shared.claim_teardown() {
            return;
        }

        let session = self
            .shared
            .session
            .lock()
            .expect("session lock poisoned")
            .clone();
        let Some(session) = session else {
            return;
        };
        let Some(handle) = self.reactor_handle() else {
            return;
        };

        let shared = Arc::clone(&self.shared);
        let reactor = handle.clone();
        handle.spawn(async move {
            shared.advance(LinkEvent::StopRequested);
            match session.leave().await {
                Ok(reason) => info!(%reason, "left realm"),
                Err(err) => warn!(error = %err, "leave failed"),
            }
            shared.advance(LinkEvent::RealmLeft);
            if let Err(err) = session.stop().await {
                warn!(error = %err, "session stop failed");
            }
            shared.advance(LinkEvent::SessionStopped);
            shared
                .session
                .lock()
                .expect("session lock poisoned")
                .take();
            reactor.request_stop();
        });
    }

    /// Block until both background threads have terminated, then reset the
    /// manager for reuse. Required after `stop()` before restart or drop.
    pub fn join(&self) {
        let taken = self.threads.lock().expect("threads lock poisoned").take();
        if let Some(threads) = taken {
            if threads.connect.join().is_err() {
                error!("connect thread panicked");
            }
            if threads.reactor.join().is_err() {
                error!("event loop thread panicked");
            }
        }
        self.release();
    }

    fn reactor_handle(&self) -> Option<ReactorHandle> {
        self.threads
            .lock()
            .expect("threads lock poisoned")
            .as_ref()
            .map(|t| t.handle.clone())
    }

    /// Claim the start gate. Reaps finished threads from a previous attempt
    /// first, so a link that tore itself down can be started again without
    /// an explicit `join()`.
    fn try_claim(&self) -> bool {
        self.reap_finished();
        self.shared
            .start_gate
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn reap_finished(&self) {
        let mut threads = self.threads.lock().expect("threads lock poisoned");
        if threads.is_some() && !self.is_running() {
            if let Some(t) = threads.take() {
                if t.connect.join().is_err() {
                    error!("connect thread panicked");
                }
                if t.reactor.join().is_err() {
                    error!("event loop thread panicked");
                }
            }
            drop(threads);
            self.release();
        }
    }

    fn release(&self) {
        self.shared
            .session
            .lock()
            .expect("session lock poisoned")
            .take();
        self.shared.start_gate.store(false, Ordering::SeqCst);
    }

    fn spawn_threads(&self, setup: SetupFn) {
        info!(
            endpoint = %self.settings.endpoint,
            realm = %self.settings.realm,
            "starting router link"
        );
        self.shared.reset_for_start();
        self.shared.running.store(true, Ordering::SeqCst);

        let on_exit = {
            let shared = Arc::clone(&self.shared);
            move || shared.running.store(false, Ordering::SeqCst)
        };
        let (handle, reactor_thread) =
            spawn_reactor(on_exit).expect("failed to spawn event loop thread");

        let connect_thread = {
            let shared = Arc::clone(&self.shared);
            let settings = self.settings.clone();
            let factory = Arc::clone(&self.factory);
            let reactor = handle.clone();
            thread::Builder::new()
                .name("wamplink-connect".to_string())
                .spawn(move || connect::drive(shared, settings, factory, reactor, setup))
                .expect("failed to spawn connect thread")
        };

        *self.threads.lock().expect("threads lock poisoned") = Some(Threads {
            connect: connect_thread,
            reactor: reactor_thread,
            handle,
        });
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
        self.join();
    }
}
