//! WAMP Link Core
//!
//! Stable types shared between the connection runtime and its hosts:
//! - [`Settings`]: resolved router endpoint, realm and retry policy
//! - [`RouterSession`] / [`SessionFactory`]: the narrow capability the
//!   runtime drives, satisfied by a real client or a scripted fake
//! - [`LinkPhase`]: the pure connect/teardown state machine
//! - [`ParameterQueue`]: bounded hand-off for remote parameter changes
//!
//! No I/O and no threads live here - this is the "what", the runtime
//! crate supplies the "how".

pub mod errors;
pub mod link;
pub mod params;
pub mod session;
pub mod settings;

pub use errors::{SessionError, SessionResult};
pub use link::{LinkEvent, LinkPhase, PhaseChange, TransitionError};
pub use params::{ParameterChange, ParameterQueue, QueueFull};
pub use session::{
    Args, Invocation, ProcedureHandler, Registration, RouterSession, SessionFactory,
};
pub use settings::{RouterEndpoint, Settings};
