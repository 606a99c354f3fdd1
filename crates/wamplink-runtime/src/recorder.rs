//! Live sample recording
//!
//! Forwards scalar simulation results to a router topic as
//! `(simulation time, value)` tuples, one publish per sample, through an
//! already-established link. Samples emitted while the link is down are
//! dropped and counted rather than buffered - live viewers care about the
//! current value, not history.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use crate::manager::ConnectionManager;

pub struct LiveRecorder {
    link: Arc<ConnectionManager>,
    topic: String,
    dropped: AtomicU64,
}

impl LiveRecorder {
    pub fn new(link: Arc<ConnectionManager>, topic: impl Into<String>) -> Self {
        Self {
            link,
            topic: topic.into(),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Samples emitted while no session was established
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Publish one sample. Returns false when the link was not usable.
    pub fn record(&self, sim_time: &str, value: impl Into<Value>) -> bool {
        let sent = self
            .link
            .publish(&self.topic, vec![json!(sim_time), value.into()]);
        if !sent {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(topic = %self.topic, "sample dropped, link not established");
        }
        sent
    }
}
