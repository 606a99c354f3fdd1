//! Remote parameter changes
//!
//! Callers on the router side request parameter changes through the
//! `parameter.set` procedure; the simulation applies them at a safe point in
//! its own event loop. The hand-off in between is this bounded queue: owned
//! by one service instance, shared by `Arc`, never global.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use thiserror::Error;

/// One pending parameter change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterChange {
    /// Dotted path of the target module
    pub module: String,
    /// Parameter name within the module
    pub parameter: String,
    /// New value, uninterpreted here
    pub value: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("parameter queue full (capacity {capacity})")]
pub struct QueueFull {
    pub capacity: usize,
}

// ----------------------------------------------------------------------------
// Parameter Queue
// ----------------------------------------------------------------------------

/// Bounded multi-producer queue of pending parameter changes.
///
/// Producers are procedure handlers on the event-loop thread; the consumer is
/// the simulation thread draining at its own pace. When full, pushes fail
/// rather than block - the caller gets the error back through the RPC result.
#[derive(Debug)]
pub struct ParameterQueue {
    inner: Mutex<VecDeque<ParameterChange>>,
    capacity: usize,
}

impl ParameterQueue {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "parameter queue capacity must be non-zero");
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("parameter queue poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue a change; fails when the queue is at capacity.
    pub fn push(&self, change: ParameterChange) -> Result<(), QueueFull> {
        let mut queue = self.inner.lock().expect("parameter queue poisoned");
        if queue.len() >= self.capacity {
            return Err(QueueFull {
                capacity: self.capacity,
            });
        }
        queue.push_back(change);
        Ok(())
    }

    /// Take all pending changes in arrival order.
    pub fn drain(&self) -> Vec<ParameterChange> {
        let mut queue = self.inner.lock().expect("parameter queue poisoned");
        queue.drain(..).collect()
    }
}
