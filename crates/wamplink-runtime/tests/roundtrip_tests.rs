//! Round-trip tests through the scripted router
//!
//! Publish/provide traffic over an established link: topic names and
//! argument tuples must come back exactly as supplied.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::json;
use wamplink_harness::{ScriptedFactory, ScriptedRouter};
use wamplink_runtime::{
    Args, ConnectionManager, ParameterChange, ParameterLookup, ParameterService, RouterSession,
    Settings,
};

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

fn rig() -> (Arc<ScriptedRouter>, Arc<ConnectionManager>) {
    let router = Arc::new(ScriptedRouter::well_behaved());
    let factory = Arc::new(ScriptedFactory::new(Arc::clone(&router)));
    let manager = Arc::new(ConnectionManager::new(Settings::testing(), factory));
    (router, manager)
}

#[test]
fn publish_echoes_through_a_provided_procedure() {
    let (router, manager) = rig();
    let echoed: Arc<Mutex<Vec<(String, Args)>>> = Arc::new(Mutex::new(Vec::new()));

    // Setup registers an echo procedure under the topic name; the scripted
    // router routes publishes on that topic to it.
    let sink = Arc::clone(&echoed);
    manager.start(move |session| {
        let handler_sink = Arc::clone(&sink);
        tokio::spawn(async move {
            session
                .provide(
                    "sim.sample",
                    Arc::new(move |invocation| {
                        handler_sink
                            .lock()
                            .unwrap()
                            .push((invocation.procedure, invocation.args));
                        Ok(Vec::new())
                    }),
                )
                .await
                .expect("provide failed");
        });
        true
    });

    assert!(wait_until(Duration::from_secs(2), || router
        .provides("sim.sample")));

    let args = vec![json!("3.14s"), json!({"host": "net.host[0]", "v": 1.5})];
    assert!(manager.publish("sim.sample", args.clone()));

    assert!(wait_until(Duration::from_secs(2), || !echoed
        .lock()
        .unwrap()
        .is_empty()));
    let echoed = echoed.lock().unwrap();
    assert_eq!(echoed.len(), 1);
    assert_eq!(echoed[0].0, "sim.sample");
    assert_eq!(echoed[0].1, args);

    // The router saw the identical publish.
    assert_eq!(router.publishes(), vec![("sim.sample".to_string(), args)]);

    manager.stop();
    manager.join();
}

#[test]
fn parameter_service_round_trip_over_the_link() {
    let (router, manager) = rig();

    let lookup: ParameterLookup = Arc::new(|module, parameter| {
        (module == "net.host[0]" && parameter == "txPower").then(|| "20mW".to_string())
    });
    let service = Arc::new(ParameterService::new(32, lookup));
    let queue = service.queue();

    let setup_service = Arc::clone(&service);
    manager.start(move |session| setup_service.register(&session));

    assert!(wait_until(Duration::from_secs(2), || {
        router.provides("opplive.parameter.set") && router.provides("opplive.parameter.get")
    }));

    // Remote caller changes a parameter; the simulation drains it later.
    router
        .call(
            "opplive.parameter.set",
            vec![json!("net.host[0]"), json!("txPower"), json!("40mW")],
        )
        .expect("set call failed");
    assert_eq!(
        queue.drain(),
        vec![ParameterChange {
            module: "net.host[0]".into(),
            parameter: "txPower".into(),
            value: "40mW".into(),
        }]
    );

    // Remote caller reads a parameter through the injected lookup.
    let value = router
        .call(
            "opplive.parameter.get",
            vec![json!("net.host[0]"), json!("txPower")],
        )
        .expect("get call failed");
    assert_eq!(value, vec![json!("20mW")]);

    manager.stop();
    manager.join();
}
