//! Cancellation for in-flight detections: shared abort tokens per task.
//!
//! The supervisor that single-flights detections registers each task here
//! and hands the token into `detect`; the detector checks it at every
//! suspension point and surfaces an aborted error without resetting.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Cloneable cancellation flag checked at detection suspension points.
#[derive(Debug, Clone, Default)]
pub struct AbortToken(Arc<AtomicBool>);

impl AbortToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the detection aborts at its next suspension point.
    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Registry of task id -> abort token for running detections.
#[derive(Default)]
pub struct TaskControl {
    tasks: RwLock<HashMap<String, AbortToken>>,
}

impl TaskControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a running detection; returns the token to pass into `detect`.
    pub fn register(&self, task_id: &str) -> AbortToken {
        let token = AbortToken::new();
        self.tasks
            .write()
            .unwrap()
            .insert(task_id.to_string(), token.clone());
        token
    }

    /// Unregister a task (call when its detection returns, success or failure).
    pub fn unregister(&self, task_id: &str) {
        self.tasks.write().unwrap().remove(task_id);
    }

    /// Request abort for a task's in-flight detection, if one is registered.
    pub fn request_abort(&self, task_id: &str) {
        if let Some(token) = self.tasks.read().unwrap().get(task_id) {
            token.abort();
        }
    }
}
