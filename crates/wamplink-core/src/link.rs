//! Link state machine
//!
//! Pure connect/teardown lifecycle for one router link. The state is an
//! enum consumed by [`LinkPhase::apply`]; the connect driver in the runtime
//! crate performs the I/O and feeds the outcomes back in as [`LinkEvent`]s,
//! which keeps the retry and cancellation logic inspectable without a
//! transport.
//!
//! Happy path:
//! `Idle → Connecting → Connected → SessionStarted → Joined → SettingUp →
//! Established`, then `Stopping → Left → Stopped` on shutdown. `Failed` is
//! absorbing: a handshake-fatal error ends the attempt and only a fresh
//! `start` leaves it.

use thiserror::Error;

// ----------------------------------------------------------------------------
// Phases
// ----------------------------------------------------------------------------

/// Lifecycle phase of one connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkPhase {
    /// No attempt in progress
    Idle,
    /// Transport connect in progress; `attempts` counts refused tries
    Connecting { attempts: u32 },
    /// Transport is up, session handshake not yet started
    Connected,
    /// Protocol handshake completed
    SessionStarted,
    /// Realm joined under the router-assigned session id
    Joined { session_id: u64 },
    /// Host setup callback dispatched, result pending
    SettingUp { session_id: u64 },
    /// Steady state: session usable for publish/provide/exec
    Established { session_id: u64 },
    /// Leave requested, goodbye pending
    Stopping,
    /// Realm left, session object not yet stopped
    Left,
    /// Terminal: threads may exit, state fully reset by the next start
    Stopped,
    /// Terminal: non-retryable error ended this attempt
    Failed { reason: String },
}

/// Outcomes the connect driver feeds into the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    ConnectRequested,
    /// Router not listening yet; stays in `Connecting`, retried after backoff
    TransportRefused,
    TransportConnected,
    /// Non-retryable transport failure during connect
    TransportFailed(String),
    SessionUp,
    RealmJoined(u64),
    /// Fatal failure anywhere in start/join/setup
    HandshakeFailed(String),
    SetupDispatched,
    SetupAccepted,
    /// Setup callback returned false: tear this attempt down
    SetupRejected,
    StopRequested,
    RealmLeft,
    SessionStopped,
}

/// Record of one phase change, kept in the manager's bounded trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseChange {
    pub from: &'static str,
    pub to: &'static str,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid link transition: {event:?} in phase {phase}")]
pub struct TransitionError {
    pub phase: &'static str,
    pub event: LinkEvent,
}

// ----------------------------------------------------------------------------
// Transitions
// ----------------------------------------------------------------------------

impl LinkPhase {
    pub fn name(&self) -> &'static str {
        match self {
            LinkPhase::Idle => "idle",
            LinkPhase::Connecting { .. } => "connecting",
            LinkPhase::Connected => "connected",
            LinkPhase::SessionStarted => "session-started",
            LinkPhase::Joined { .. } => "joined",
            LinkPhase::SettingUp { .. } => "setting-up",
            LinkPhase::Established { .. } => "established",
            LinkPhase::Stopping => "stopping",
            LinkPhase::Left => "left",
            LinkPhase::Stopped => "stopped",
            LinkPhase::Failed { .. } => "failed",
        }
    }

    /// True once this attempt can make no further progress
    pub fn is_terminal(&self) -> bool {
        matches!(self, LinkPhase::Stopped | LinkPhase::Failed { .. })
    }

    /// True while the session may be used for traffic
    pub fn is_established(&self) -> bool {
        matches!(self, LinkPhase::Established { .. })
    }

    /// Consume the current phase and produce the next one.
    pub fn apply(self, event: LinkEvent) -> Result<LinkPhase, TransitionError> {
        use LinkEvent as E;
        use LinkPhase as P;

        let next = match (&self, event) {
            (P::Idle, E::ConnectRequested) => P::Connecting { attempts: 0 },

            (P::Connecting { attempts }, E::TransportRefused) => P::Connecting {
                attempts: attempts + 1,
            },
            (P::Connecting { .. }, E::TransportConnected) => P::Connected,
            (P::Connecting { .. }, E::TransportFailed(reason)) => P::Failed { reason },
            // Cancellation observed before the transport ever came up: no
            // session to unwind, straight to terminal.
            (P::Connecting { .. }, E::StopRequested) => P::Stopped,

            (P::Connected, E::SessionUp) => P::SessionStarted,
            // Stop won the race against the handshake: the transport is up
            // but no session was started, so there is nothing to unwind.
            (P::Connected, E::StopRequested) => P::Stopped,
            (P::Connected, E::HandshakeFailed(reason)) => P::Failed { reason },

            (P::SessionStarted, E::RealmJoined(session_id)) => P::Joined { session_id },
            (P::SessionStarted, E::HandshakeFailed(reason)) => P::Failed { reason },

            (P::Joined { session_id }, E::SetupDispatched) => P::SettingUp {
                session_id: *session_id,
            },
            (P::Joined { .. }, E::HandshakeFailed(reason)) => P::Failed { reason },

            (P::SettingUp { session_id }, E::SetupAccepted) => P::Established {
                session_id: *session_id,
            },
            (P::SettingUp { .. }, E::SetupRejected) => P::Stopping,
            (P::SettingUp { .. }, E::HandshakeFailed(reason)) => P::Failed { reason },

            (P::Established { .. }, E::StopRequested) => P::Stopping,

            // Leave completion proceeds whether the goodbye succeeded or not.
            (P::Stopping, E::RealmLeft) => P::Left,
            (P::Left, E::SessionStopped) => P::Stopped,

            (_, event) => {
                return Err(TransitionError {
                    phase: self.name(),
                    event,
                })
            }
        };
        Ok(next)
    }
}

impl std::fmt::Display for LinkPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(mut phase: LinkPhase, events: &[LinkEvent]) -> LinkPhase {
        for event in events {
            phase = phase.apply(event.clone()).expect("transition");
        }
        phase
    }

    #[test]
    fn happy_path_reaches_established() {
        let end = walk(
            LinkPhase::Idle,
            &[
                LinkEvent::ConnectRequested,
                LinkEvent::TransportConnected,
                LinkEvent::SessionUp,
                LinkEvent::RealmJoined(42),
                LinkEvent::SetupDispatched,
                LinkEvent::SetupAccepted,
            ],
        );
        assert_eq!(end, LinkPhase::Established { session_id: 42 });
        assert!(end.is_established());
        assert!(!end.is_terminal());
    }

    #[test]
    fn refusal_stays_connecting_and_counts_attempts() {
        let end = walk(
            LinkPhase::Idle,
            &[
                LinkEvent::ConnectRequested,
                LinkEvent::TransportRefused,
                LinkEvent::TransportRefused,
                LinkEvent::TransportRefused,
            ],
        );
        assert_eq!(end, LinkPhase::Connecting { attempts: 3 });
    }

    #[test]
    fn stop_during_retry_is_terminal_without_session() {
        let end = walk(
            LinkPhase::Idle,
            &[
                LinkEvent::ConnectRequested,
                LinkEvent::TransportRefused,
                LinkEvent::StopRequested,
            ],
        );
        assert_eq!(end, LinkPhase::Stopped);
        assert!(end.is_terminal());
    }

    #[test]
    fn rejected_setup_unwinds_through_stopping() {
        let end = walk(
            LinkPhase::Idle,
            &[
                LinkEvent::ConnectRequested,
                LinkEvent::TransportConnected,
                LinkEvent::SessionUp,
                LinkEvent::RealmJoined(7),
                LinkEvent::SetupDispatched,
                LinkEvent::SetupRejected,
                LinkEvent::RealmLeft,
                LinkEvent::SessionStopped,
            ],
        );
        assert_eq!(end, LinkPhase::Stopped);
    }

    #[test]
    fn handshake_failure_absorbs_into_failed() {
        let end = walk(
            LinkPhase::Idle,
            &[
                LinkEvent::ConnectRequested,
                LinkEvent::TransportConnected,
                LinkEvent::HandshakeFailed("bad magic".into()),
            ],
        );
        assert_eq!(
            end,
            LinkPhase::Failed {
                reason: "bad magic".into()
            }
        );
        assert!(end.is_terminal());
    }

    #[test]
    fn publishing_from_idle_is_rejected() {
        let err = LinkPhase::Idle
            .apply(LinkEvent::SetupAccepted)
            .unwrap_err();
        assert_eq!(err.phase, "idle");
    }

    #[test]
    fn established_cannot_rejoin() {
        let err = LinkPhase::Established { session_id: 1 }
            .apply(LinkEvent::RealmJoined(2))
            .unwrap_err();
        assert_eq!(err.phase, "established");
    }
}
