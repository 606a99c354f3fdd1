//! Session capability
//!
//! The runtime never sees the wire. It drives an opaque session object
//! through exactly seven operations; a real WAMP client and the scripted
//! fake router in `wamplink-harness` both satisfy this trait, so the
//! connection state machine is testable without any network.

use crate::errors::SessionResult;
use async_trait::async_trait;
use std::sync::Arc;

use crate::Settings;

/// Positional argument tuple carried by publishes and invocations
pub type Args = Vec<serde_json::Value>;

/// A call delivered to a provided procedure
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Procedure name the caller used
    pub procedure: String,
    /// Positional arguments supplied by the caller
    pub args: Args,
}

/// Handler for a provided procedure. Runs on the event-loop thread; must not
/// block.
pub type ProcedureHandler = Arc<dyn Fn(Invocation) -> SessionResult<Args> + Send + Sync>;

/// Router acknowledgement of a `provide`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Router-assigned registration id
    pub id: u64,
    /// Procedure name as registered
    pub procedure: String,
}

// ----------------------------------------------------------------------------
// Router Session
// ----------------------------------------------------------------------------

/// One logical connection to the router.
///
/// Operations must be issued in protocol order: `connect`, `start`,
/// `join`, then any number of `publish`/`provide`, then `leave`, `stop`.
/// Every async result resolves or fails exactly once.
#[async_trait]
pub trait RouterSession: Send + Sync + 'static {
    /// Establish the underlying transport
    async fn connect(&self) -> SessionResult<()>;

    /// Begin the protocol handshake on the connected transport
    async fn start(&self) -> SessionResult<()>;

    /// Join a realm; resolves to the router-assigned session id
    async fn join(&self, realm: &str) -> SessionResult<u64>;

    /// Leave the realm; resolves to the router's goodbye reason
    async fn leave(&self) -> SessionResult<String>;

    /// Shut the session object down
    async fn stop(&self) -> SessionResult<()>;

    /// Publish an event to a topic
    async fn publish(&self, topic: &str, args: Args) -> SessionResult<()>;

    /// Register a callable procedure under `procedure`
    async fn provide(&self, procedure: &str, handler: ProcedureHandler)
        -> SessionResult<Registration>;
}

/// Produces a fresh session for each connection attempt.
///
/// The manager discards the session on teardown and asks for a new one on
/// the next `start`, so implementations must not hand out exhausted state.
pub trait SessionFactory: Send + Sync + 'static {
    fn open(&self, settings: &Settings) -> Arc<dyn RouterSession>;
}

impl<F> SessionFactory for F
where
    F: Fn(&Settings) -> Arc<dyn RouterSession> + Send + Sync + 'static,
{
    fn open(&self, settings: &Settings) -> Arc<dyn RouterSession> {
        self(settings)
    }
}
