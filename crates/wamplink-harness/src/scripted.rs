//! Scripted fake router session

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;
use wamplink_core::{
    Args, Invocation, ProcedureHandler, Registration, RouterSession, SessionError, SessionFactory,
    SessionResult, Settings,
};

// ----------------------------------------------------------------------------
// Script
// ----------------------------------------------------------------------------

/// Scripted behavior for a [`ScriptedRouter`]
#[derive(Debug, Clone)]
pub struct RouterScript {
    /// Refuse this many connect attempts before accepting
    pub refuse_connects: u32,
    /// Fail the session handshake with this error
    pub fail_start: Option<SessionError>,
    /// Fail the realm join with this error
    pub fail_join: Option<SessionError>,
    /// Session id handed out on a successful join
    pub session_id: u64,
    /// Goodbye reason returned by `leave`
    pub goodbye_reason: String,
}

impl Default for RouterScript {
    fn default() -> Self {
        Self {
            refuse_connects: 0,
            fail_start: None,
            fail_join: None,
            session_id: 9_0001,
            goodbye_reason: "wamp.close.goodbye_and_out".to_string(),
        }
    }
}

impl RouterScript {
    /// Router that refuses the first `n` connects, then behaves normally
    pub fn refusing(n: u32) -> Self {
        Self {
            refuse_connects: n,
            ..Self::default()
        }
    }
}

// ----------------------------------------------------------------------------
// Scripted Router
// ----------------------------------------------------------------------------

#[derive(Default)]
struct RouterState {
    connect_attempts: u32,
    connected: bool,
    started: bool,
    joined_realm: Option<String>,
    left: bool,
    stopped: bool,
    next_registration_id: u64,
    procedures: HashMap<String, ProcedureHandler>,
    publishes: Vec<(String, Args)>,
}

/// In-process stand-in for a router-backed session.
///
/// Accepts the protocol operations in order, enforces the same ordering a
/// real router would (no publish before join, nothing after leave), and
/// routes a publish to a provided procedure registered under the same name
/// so round trips can be observed end to end.
pub struct ScriptedRouter {
    script: RouterScript,
    state: Mutex<RouterState>,
}

impl ScriptedRouter {
    pub fn new(script: RouterScript) -> Self {
        Self {
            script,
            state: Mutex::new(RouterState::default()),
        }
    }

    pub fn well_behaved() -> Self {
        Self::new(RouterScript::default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RouterState> {
        self.state.lock().expect("scripted router poisoned")
    }

    /// Total connect attempts seen, including refused ones
    pub fn connect_attempts(&self) -> u32 {
        self.lock().connect_attempts
    }

    pub fn joined_realm(&self) -> Option<String> {
        self.lock().joined_realm.clone()
    }

    pub fn has_left(&self) -> bool {
        self.lock().left
    }

    pub fn has_stopped(&self) -> bool {
        self.lock().stopped
    }

    pub fn provides(&self, procedure: &str) -> bool {
        self.lock().procedures.contains_key(procedure)
    }

    /// Everything published so far, in order
    pub fn publishes(&self) -> Vec<(String, Args)> {
        self.lock().publishes.clone()
    }

    /// Invoke a provided procedure the way a remote caller would.
    pub fn call(&self, procedure: &str, args: Args) -> SessionResult<Args> {
        let handler = self
            .lock()
            .procedures
            .get(procedure)
            .cloned()
            .ok_or_else(|| SessionError::NoSuchProcedure(procedure.to_string()))?;
        handler(Invocation {
            procedure: procedure.to_string(),
            args,
        })
    }

    /// Reset per-session flags so the same fake can back a fresh attempt.
    /// Cumulative counters and the publish log survive.
    fn reset_for_new_session(&self) {
        let mut state = self.lock();
        state.connected = false;
        state.started = false;
        state.joined_realm = None;
        state.left = false;
        state.stopped = false;
        state.procedures.clear();
    }

    fn require_joined(state: &RouterState) -> SessionResult<()> {
        if state.joined_realm.is_none() || state.left || state.stopped {
            return Err(SessionError::Closed("no active realm session".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RouterSession for ScriptedRouter {
    async fn connect(&self) -> SessionResult<()> {
        let mut state = self.lock();
        state.connect_attempts += 1;
        if state.connect_attempts <= self.script.refuse_connects {
            debug!(attempt = state.connect_attempts, "scripted refusal");
            return Err(SessionError::ConnectionRefused);
        }
        state.connected = true;
        Ok(())
    }

    async fn start(&self) -> SessionResult<()> {
        let mut state = self.lock();
        if !state.connected {
            return Err(SessionError::Closed("transport not connected".into()));
        }
        if let Some(err) = &self.script.fail_start {
            return Err(err.clone());
        }
        state.started = true;
        Ok(())
    }

    async fn join(&self, realm: &str) -> SessionResult<u64> {
        let mut state = self.lock();
        if !state.started {
            return Err(SessionError::Closed("session not started".into()));
        }
        if let Some(err) = &self.script.fail_join {
            return Err(err.clone());
        }
        state.joined_realm = Some(realm.to_string());
        Ok(self.script.session_id)
    }

    async fn leave(&self) -> SessionResult<String> {
        let mut state = self.lock();
        Self::require_joined(&state)?;
        state.left = true;
        Ok(self.script.goodbye_reason.clone())
    }

    async fn stop(&self) -> SessionResult<()> {
        self.lock().stopped = true;
        Ok(())
    }

    async fn publish(&self, topic: &str, args: Args) -> SessionResult<()> {
        // Route to a same-named procedure outside the lock: the handler may
        // call back into this session.
        let handler = {
            let mut state = self.lock();
            Self::require_joined(&state)?;
            state.publishes.push((topic.to_string(), args.clone()));
            state.procedures.get(topic).cloned()
        };
        if let Some(handler) = handler {
            let _ = handler(Invocation {
                procedure: topic.to_string(),
                args,
            });
        }
        Ok(())
    }

    async fn provide(
        &self,
        procedure: &str,
        handler: ProcedureHandler,
    ) -> SessionResult<Registration> {
        let mut state = self.lock();
        Self::require_joined(&state)?;
        state.next_registration_id += 1;
        let id = state.next_registration_id;
        state.procedures.insert(procedure.to_string(), handler);
        Ok(Registration {
            id,
            procedure: procedure.to_string(),
        })
    }
}

// ----------------------------------------------------------------------------
// Scripted Factory
// ----------------------------------------------------------------------------

/// Hands the same scripted router out as a "fresh" session per attempt,
/// resetting its per-session state and counting how many sessions the
/// runtime asked for (exactly one per `start`).
pub struct ScriptedFactory {
    router: Arc<ScriptedRouter>,
    opened: AtomicU32,
}

impl ScriptedFactory {
    pub fn new(router: Arc<ScriptedRouter>) -> Self {
        Self {
            router,
            opened: AtomicU32::new(0),
        }
    }

    pub fn sessions_opened(&self) -> u32 {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn router(&self) -> Arc<ScriptedRouter> {
        Arc::clone(&self.router)
    }
}

impl SessionFactory for ScriptedFactory {
    fn open(&self, settings: &Settings) -> Arc<dyn RouterSession> {
        debug!(endpoint = %settings.endpoint, "opening scripted session");
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.router.reset_for_new_session();
        Arc::clone(&self.router) as Arc<dyn RouterSession>
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn bring_up(router: &ScriptedRouter) {
        router.connect().await.unwrap();
        router.start().await.unwrap();
        router.join("opplive").await.unwrap();
    }

    #[tokio::test]
    async fn refuses_the_scripted_number_of_connects() {
        let router = ScriptedRouter::new(RouterScript::refusing(2));
        assert!(matches!(
            router.connect().await,
            Err(SessionError::ConnectionRefused)
        ));
        assert!(matches!(
            router.connect().await,
            Err(SessionError::ConnectionRefused)
        ));
        router.connect().await.unwrap();
        assert_eq!(router.connect_attempts(), 3);
    }

    #[tokio::test]
    async fn enforces_protocol_ordering() {
        let router = ScriptedRouter::well_behaved();
        assert!(router.start().await.is_err());
        router.connect().await.unwrap();
        assert!(router.join("opplive").await.is_err());
        router.start().await.unwrap();
        assert!(router.publish("t", vec![]).await.is_err());
        router.join("opplive").await.unwrap();
        router.publish("t", vec![]).await.unwrap();
    }

    #[tokio::test]
    async fn publish_routes_to_same_named_procedure() {
        let router = ScriptedRouter::well_behaved();
        bring_up(&router).await;

        let seen: Arc<Mutex<Vec<Invocation>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        router
            .provide(
                "sim.sample",
                Arc::new(move |inv| {
                    sink.lock().unwrap().push(inv);
                    Ok(vec![])
                }),
            )
            .await
            .unwrap();

        router
            .publish("sim.sample", vec![json!("12.5s"), json!(42)])
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].procedure, "sim.sample");
        assert_eq!(seen[0].args, vec![json!("12.5s"), json!(42)]);
    }

    #[tokio::test]
    async fn factory_reset_supports_a_second_attempt() {
        let router = Arc::new(ScriptedRouter::well_behaved());
        let factory = ScriptedFactory::new(Arc::clone(&router));
        let settings = Settings::testing();

        let session = factory.open(&settings);
        session.connect().await.unwrap();
        session.start().await.unwrap();
        session.join("opplive").await.unwrap();
        session.leave().await.unwrap();
        session.stop().await.unwrap();

        let session = factory.open(&settings);
        session.connect().await.unwrap();
        session.start().await.unwrap();
        assert_eq!(session.join("opplive").await.unwrap(), 9_0001);
        assert_eq!(factory.sessions_opened(), 2);
    }
}
