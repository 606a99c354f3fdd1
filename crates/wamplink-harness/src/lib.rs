//! WAMP Link Harness
//!
//! Deterministic fake router for tests: a [`ScriptedRouter`] satisfies the
//! [`wamplink_core::RouterSession`] capability with scripted failures
//! (connection refusals, handshake errors) and records everything the
//! runtime does to it, so lifecycle and round-trip behavior can be asserted
//! without any network.

mod scripted;

pub use scripted::{RouterScript, ScriptedFactory, ScriptedRouter};
