//! WAMP Link Runtime
//!
//! The connection-lifecycle manager bridging a long-running simulation
//! process to a WAMP-style router:
//! - [`ConnectionManager`]: thread-safe façade owning one session and the
//!   two background threads that drive it
//! - connect thread: fixed-backoff retry loop and the ordered
//!   `start → join → setup` handshake
//! - event-loop thread: current-thread reactor on which every async
//!   completion and host callback executes
//! - host glue: [`ParameterService`] (remote parameter access) and
//!   [`LiveRecorder`] (live result publishing)
//!
//! `wamplink-core` defines the session capability and the pure state
//! machine; any client satisfying [`wamplink_core::RouterSession`] plugs in
//! here, including the scripted fake in `wamplink-harness`.

mod connect;
mod manager;
mod reactor;

pub mod callee;
pub mod recorder;

pub use callee::{ParameterLookup, ParameterService, ProcedureNames};
pub use manager::{ConnectionManager, SetupFn};
pub use recorder::LiveRecorder;

// Re-export core types hosts need at the façade boundary.
pub use wamplink_core::{
    Args, LinkPhase, ParameterChange, ParameterQueue, RouterSession, SessionError, SessionFactory,
    Settings,
};
