//! Per-task lock registry with owned, reentrant guards.
//!
//! Guards are owned (not borrowed from the registry) so a data-blob reader
//! can carry its task's lock until dropped. Reentrancy is per thread: the
//! detector rewrites the journal while it still holds the blob reader, and
//! both touch the same task.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, ThreadId};

#[derive(Debug, Clone, Copy)]
struct Owner {
    thread: ThreadId,
    depth: usize,
}

#[derive(Default)]
struct LockState {
    owner: Mutex<Option<Owner>>,
    cv: Condvar,
}

/// Registry of per-task locks keyed by task id.
#[derive(Default)]
pub(crate) struct TaskLocks {
    map: Mutex<HashMap<String, Arc<LockState>>>,
}

impl TaskLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Block until the task's lock is free (or already held by this thread)
    /// and return an owned guard.
    pub(crate) fn acquire(&self, task_id: &str) -> TaskGuard {
        let state = {
            let mut map = self.map.lock().unwrap();
            Arc::clone(map.entry(task_id.to_string()).or_default())
        };
        let me = thread::current().id();
        {
            let mut owner = state.owner.lock().unwrap();
            loop {
                match owner.as_mut() {
                    None => {
                        *owner = Some(Owner {
                            thread: me,
                            depth: 1,
                        });
                        break;
                    }
                    Some(o) if o.thread == me => {
                        o.depth += 1;
                        break;
                    }
                    Some(_) => owner = state.cv.wait(owner).unwrap(),
                }
            }
        }
        TaskGuard { state }
    }
}

/// Owned guard over one task's artifacts; released on drop.
pub(crate) struct TaskGuard {
    state: Arc<LockState>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        let mut owner = self.state.owner.lock().unwrap();
        if let Some(o) = owner.as_mut() {
            o.depth -= 1;
            if o.depth == 0 {
                *owner = None;
                self.state.cv.notify_one();
            }
        }
    }
}
