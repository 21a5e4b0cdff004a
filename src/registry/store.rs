// src/registry/store.rs

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::registry::task::Task;
use crate::types::TaskId;

/// In-memory table of every task known to this process.
///
/// Cloning yields another handle to the same table. Readers share the lock;
/// writers hold it only for the duration of a closure, so concurrent polls
/// never wait on anything slower than a map access. Entries are never
/// removed.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    inner: Arc<RwLock<HashMap<TaskId, Task>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new task. Returns `false` (and leaves the table unchanged)
    /// if the id is already taken.
    pub fn insert(&self, task: Task) -> bool {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if map.contains_key(&task.id) {
            return false;
        }
        map.insert(task.id, task);
        true
    }

    pub fn get(&self, id: &TaskId) -> Option<Task> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Copy of every task, in no particular order.
    pub fn snapshot(&self) -> Vec<Task> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Mutate one task under the write lock.
    ///
    /// Returns `None` when the id is unknown.
    pub fn update<R>(&self, id: &TaskId, f: impl FnOnce(&mut Task) -> R) -> Option<R> {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.get_mut(id).map(f)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
