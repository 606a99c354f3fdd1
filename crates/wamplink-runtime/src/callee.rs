//! Remote parameter access
//!
//! Registers the `parameter.set` / `parameter.get` procedures on an
//! established session. Set requests land in an instance-owned bounded
//! [`ParameterQueue`] for the simulation to drain at a safe point; get
//! requests are answered through an injected lookup closure, keeping the
//! host's module/parameter model out of this crate.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{error, info};
use wamplink_core::{
    Args, Invocation, ParameterChange, ParameterQueue, ProcedureHandler, RouterSession,
    SessionError, SessionResult,
};

/// Resolves a `(module, parameter)` pair to its current value, or None when
/// the host knows no such parameter.
pub type ParameterLookup = Arc<dyn Fn(&str, &str) -> Option<String> + Send + Sync>;

/// Procedure names the service registers on the router
#[derive(Debug, Clone)]
pub struct ProcedureNames {
    pub set_parameter: String,
    pub get_parameter: String,
}

impl Default for ProcedureNames {
    fn default() -> Self {
        Self {
            set_parameter: "opplive.parameter.set".to_string(),
            get_parameter: "opplive.parameter.get".to_string(),
        }
    }
}

// ----------------------------------------------------------------------------
// Parameter Service
// ----------------------------------------------------------------------------

/// Host-side service exposing parameter access over the router.
///
/// `register` is shaped to serve as the manager's setup callback:
///
/// ```ignore
/// let service = Arc::new(ParameterService::new(64, lookup));
/// manager.start(move |session| service.register(&session));
/// ```
pub struct ParameterService {
    names: ProcedureNames,
    queue: Arc<ParameterQueue>,
    lookup: ParameterLookup,
}

impl ParameterService {
    pub fn new(queue_capacity: usize, lookup: ParameterLookup) -> Self {
        Self::with_names(ProcedureNames::default(), queue_capacity, lookup)
    }

    pub fn with_names(
        names: ProcedureNames,
        queue_capacity: usize,
        lookup: ParameterLookup,
    ) -> Self {
        Self {
            names,
            queue: Arc::new(ParameterQueue::new(queue_capacity)),
            lookup,
        }
    }

    /// The queue the simulation drains for pending changes.
    pub fn queue(&self) -> Arc<ParameterQueue> {
        Arc::clone(&self.queue)
    }

    /// Register both procedures on the session. Must run on the event-loop
    /// thread (it is, when used as a setup callback); the registrations are
    /// issued asynchronously and failures are logged, not retried.
    pub fn register(&self, session: &Arc<dyn RouterSession>) -> bool {
        let procedures: [(String, ProcedureHandler); 2] = [
            (self.names.set_parameter.clone(), self.set_handler()),
            (self.names.get_parameter.clone(), self.get_handler()),
        ];
        for (name, handler) in procedures {
            let session = Arc::clone(session);
            tokio::spawn(async move {
                match session.provide(&name, handler).await {
                    Ok(registration) => {
                        info!(
                            procedure = %registration.procedure,
                            id = registration.id,
                            "procedure registered"
                        );
                    }
                    Err(err) => error!(procedure = %name, error = %err, "provide failed"),
                }
            });
        }
        true
    }

    fn set_handler(&self) -> ProcedureHandler {
        let queue = Arc::clone(&self.queue);
        Arc::new(move |invocation: Invocation| {
            let (module, parameter) = target_of(&invocation)?;
            let value = string_arg(&invocation.args, 2)?;
            queue
                .push(ParameterChange {
                    module,
                    parameter,
                    value,
                })
                .map_err(|err| SessionError::CallRejected(err.to_string()))?;
            Ok(Vec::new())
        })
    }

    fn get_handler(&self) -> ProcedureHandler {
        let lookup = Arc::clone(&self.lookup);
        Arc::new(move |invocation: Invocation| {
            let (module, parameter) = target_of(&invocation)?;
            match lookup(&module, &parameter) {
                Some(value) => Ok(vec![json!(value)]),
                None => Err(SessionError::CallRejected(format!(
                    "no parameter {parameter} in {module}"
                ))),
            }
        })
    }
}

fn target_of(invocation: &Invocation) -> SessionResult<(String, String)> {
    Ok((
        string_arg(&invocation.args, 0)?,
        string_arg(&invocation.args, 1)?,
    ))
}

fn string_arg(args: &Args, index: usize) -> SessionResult<String> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(SessionError::CallRejected(format!(
            "argument {index} must be a string, got {other}"
        ))),
        None => Err(SessionError::CallRejected(format!(
            "missing argument {index}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wamplink_harness::ScriptedRouter;

    fn no_lookup() -> ParameterLookup {
        Arc::new(|_, _| None)
    }

    #[tokio::test]
    async fn registers_both_procedures() {
        let router = Arc::new(ScriptedRouter::well_behaved());
        let session: Arc<dyn RouterSession> = router.clone();
        session.connect().await.unwrap();
        session.start().await.unwrap();
        session.join("opplive").await.unwrap();

        let service = ParameterService::new(8, no_lookup());
        assert!(service.register(&session));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(router.provides("opplive.parameter.set"));
        assert!(router.provides("opplive.parameter.get"));

        // A remote set lands in the owned queue.
        let reply = router
            .call(
                "opplive.parameter.set",
                vec![json!("net.host[0]"), json!("txPower"), json!("20")],
            )
            .unwrap();
        assert!(reply.is_empty());
        assert_eq!(
            service.queue().drain(),
            vec![ParameterChange {
                module: "net.host[0]".into(),
                parameter: "txPower".into(),
                value: "20".into(),
            }]
        );
    }

    #[tokio::test]
    async fn set_rejects_malformed_arguments() {
        let service = ParameterService::new(8, no_lookup());
        let set = service.set_handler();

        let err = set(Invocation {
            procedure: "opplive.parameter.set".into(),
            args: vec![json!("net.host[0]"), json!(5), json!("20")],
        })
        .unwrap_err();
        assert!(matches!(err, SessionError::CallRejected(_)));
        assert!(service.queue().is_empty());
    }

    #[tokio::test]
    async fn set_surfaces_queue_backpressure() {
        let service = ParameterService::new(1, no_lookup());
        let set = service.set_handler();
        let call = |n: u32| {
            set(Invocation {
                procedure: "opplive.parameter.set".into(),
                args: vec![json!("m"), json!("p"), json!(n.to_string())],
            })
        };

        call(1).unwrap();
        assert!(matches!(call(2), Err(SessionError::CallRejected(_))));
    }

    #[tokio::test]
    async fn get_answers_through_the_lookup() {
        let lookup: ParameterLookup = Arc::new(|module, parameter| {
            (module == "net.host[0]" && parameter == "txPower").then(|| "20mW".to_string())
        });
        let service = ParameterService::new(8, lookup);
        let get = service.get_handler();

        let found = get(Invocation {
            procedure: "opplive.parameter.get".into(),
            args: vec![json!("net.host[0]"), json!("txPower")],
        })
        .unwrap();
        assert_eq!(found, vec![json!("20mW")]);

        let missing = get(Invocation {
            procedure: "opplive.parameter.get".into(),
            args: vec![json!("net.host[0]"), json!("bogus")],
        });
        assert!(matches!(missing, Err(SessionError::CallRejected(_))));
    }
}
