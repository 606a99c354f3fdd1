//! Connect thread
//!
//! Performs the connect-retry sequence and the `start → join → setup`
//! handshake, strictly in order. All session operations are submitted to the
//! event-loop thread via [`ReactorHandle::run_on`]; only the backoff sleep
//! blocks here. The link state machine is advanced with the outcome of each
//! step, so the whole sequence is observable from the façade.
//!
//! Retry policy: only "connection refused" is retried (the router is simply
//! not up yet). Anything else during connect or the handshake abandons the
//! attempt - an infinite loop would mask configuration errors.

use std::sync::Arc;
use std::thread;

use tracing::{error, info, warn};
use wamplink_core::{LinkEvent, RouterSession, SessionFactory, Settings};

use crate::manager::{SetupFn, Shared};
use crate::reactor::ReactorHandle;

pub(crate) fn drive(
    shared: Arc<Shared>,
    settings: Settings,
    factory: Arc<dyn SessionFactory>,
    reactor: ReactorHandle,
    setup: SetupFn,
) {
    // Fresh session per attempt; the previous one is never revived.
    let session = factory.open(&settings);
    shared.advance(LinkEvent::ConnectRequested);

    loop {
        if shared.stop_pending() {
            info!("stop requested before the router link came up");
            shared.advance(LinkEvent::StopRequested);
            reactor.request_stop();
            return;
        }

        let attempt = {
            let session = Arc::clone(&session);
            reactor.run_on(async move { session.connect().await })
        };
        match attempt {
            Ok(Ok(())) => {
                info!("transport connected");
                shared.advance(LinkEvent::TransportConnected);
                break;
            }
            Ok(Err(err)) if err.is_transient() => {
                warn!(endpoint = %settings.endpoint, "no connection to router, retrying");
                shared.advance(LinkEvent::TransportRefused);
                thread::sleep(settings.retry_interval());
            }
            Ok(Err(err)) => {
                error!(error = %err, "transport connect failed");
                shared.advance(LinkEvent::TransportFailed(err.to_string()));
                reactor.request_stop();
                return;
            }
            Err(gone) => {
                error!(error = %gone, "event loop lost during connect");
                return;
            }
        }
    }

    // Stop may have been requested while the last connect resolved.
    if shared.stop_pending() {
        info!("stop requested before the session handshake");
        shared.advance(LinkEvent::StopRequested);
        reactor.request_stop();
        return;
    }

    let started = {
        let session = Arc::clone(&session);
        reactor.run_on(async move { session.start().await })
    };
    match started {
        Ok(Ok(())) => {
            info!("session started");
            shared.advance(LinkEvent::SessionUp);
        }
        Ok(Err(err)) => return handshake_failed(&shared, &reactor, "session start", &err.to_string()),
        Err(gone) => return handshake_failed(&shared, &reactor, "session start", &gone.to_string()),
    }

    let joined = {
        let session = Arc::clone(&session);
        let realm = settings.realm.clone();
        reactor.run_on(async move { session.join(&realm).await })
    };
    match joined {
        Ok(Ok(session_id)) => {
            info!(realm = %settings.realm, session_id, "joined realm");
            shared.advance(LinkEvent::RealmJoined(session_id));
        }
        Ok(Err(err)) => return handshake_failed(&shared, &reactor, "realm join", &err.to_string()),
        Err(gone) => return handshake_failed(&shared, &reactor, "realm join", &gone.to_string()),
    }

    // The session becomes visible to exec() only from here on.
    *shared.session.lock().expect("session lock poisoned") = Some(Arc::clone(&session));

    shared.advance(LinkEvent::SetupDispatched);
    let accepted = {
        let session = Arc::clone(&session);
        reactor.run_on(async move { setup(session) })
    };
    match accepted {
        Ok(true) => {
            shared.advance(LinkEvent::SetupAccepted);
            info!("link established");
            // A stop issued while the handshake ran found no established
            // session to unwind; whoever wins the claim finishes the job.
            if shared.stop_pending() && shared.claim_teardown() {
                info!("stop requested during the handshake, tearing down");
                shared.advance(LinkEvent::StopRequested);
                teardown(&shared, &reactor, &session);
            }
        }
        Ok(false) => {
            info!("setup declined the session, tearing down");
            shared.advance(LinkEvent::SetupRejected);
            teardown(&shared, &reactor, &session);
        }
        Err(_) => {
            error!("setup callback panicked on the event-loop thread");
            shared.advance(LinkEvent::HandshakeFailed("setup callback panicked".to_string()));
            shared.session.lock().expect("session lock poisoned").take();
            reactor.request_stop();
        }
    }
}

fn handshake_failed(shared: &Shared, reactor: &ReactorHandle, step: &str, reason: &str) {
    error!(step, reason, "handshake failed, abandoning this attempt");
    shared.advance(LinkEvent::HandshakeFailed(format!("{step}: {reason}")));
    shared.session.lock().expect("session lock poisoned").take();
    reactor.request_stop();
}

/// Unwind a session the setup callback rejected: leave, stop, stop the loop.
fn teardown(shared: &Shared, reactor: &ReactorHandle, session: &Arc<dyn RouterSession>) {
    let left = {
        let session = Arc::clone(session);
        reactor.run_on(async move { session.leave().await })
    };
    match left {
        Ok(Ok(reason)) => info!(%reason, "left realm"),
        Ok(Err(err)) => warn!(error = %err, "leave failed"),
        Err(gone) => {
            error!(error = %gone, "event loop lost during teardown");
            return;
        }
    }
    shared.advance(LinkEvent::RealmLeft);

    let stopped = {
        let session = Arc::clone(session);
        reactor.run_on(async move { session.stop().await })
    };
    if let Ok(Err(err)) = stopped {
        warn!(error = %err, "session stop failed");
    }
    shared.advance(LinkEvent::SessionStopped);

    shared.session.lock().expect("session lock poisoned").take();
    reactor.request_stop();
}
