use super::TaskCheckpoint;

use parking_lot::Mutex;

use std::collections::HashMap;
use std::sync::Arc;

/// A named set of checkpoints shared by the systems of a frame.
///
/// Subsystems register the checkpoints they expose and look up the ones
/// they wait on by name. The registry is an ordinary owned value: it is
/// created before the systems that use it and dropped after them, which
/// fixes the teardown order.
///
/// # Examples
///
/// ```rust,ignore
/// let registry = CheckpointRegistry::new();
/// let loaded = registry.register("assets.loaded", false);
///
/// // Elsewhere.
/// let gate = registry.find("assets.loaded").unwrap();
/// ```
#[derive(Debug, Default)]
pub struct CheckpointRegistry {
    checkpoints: Mutex<HashMap<String, Arc<TaskCheckpoint>>>,
}

impl CheckpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and registers a checkpoint under `name`.
    ///
    /// # Panics
    ///
    /// Panics if a checkpoint is already registered under `name`.
    pub fn register(&self, name: impl Into<String>, initially_open: bool) -> Arc<TaskCheckpoint> {
        let name = name.into();
        let checkpoint = Arc::new(TaskCheckpoint::new(initially_open));

        let previous = self
            .checkpoints
            .lock()
            .insert(name.clone(), checkpoint.clone());
        assert!(
            previous.is_none(),
            "checkpoint `{name}` registered twice"
        );

        tracing::trace!(name, initially_open, "checkpoint registered");
        checkpoint
    }

    pub fn find(&self, name: &str) -> Option<Arc<TaskCheckpoint>> {
        self.checkpoints.lock().get(name).cloned()
    }

    /// Unregisters the checkpoint stored under `name`.
    ///
    /// Holders of the returned checkpoint keep it alive.
    pub fn remove(&self, name: &str) -> Option<Arc<TaskCheckpoint>> {
        self.checkpoints.lock().remove(name)
    }

    /// Opens every registered checkpoint.
    ///
    /// Waiters are resumed on the calling thread, after the registry lock
    /// was released. Returns the number of checkpoints that resumed at
    /// least one waiter.
    pub fn open_all(&self) -> usize {
        self.snapshot()
            .into_iter()
            .filter(|checkpoint| checkpoint.open())
            .count()
    }

    /// Closes every registered checkpoint.
    ///
    /// # Panics
    ///
    /// Panics if computations are waiting on one of them.
    pub fn close_all(&self) {
        for checkpoint in self.snapshot() {
            checkpoint.close();
        }
    }

    pub fn len(&self) -> usize {
        self.checkpoints.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.lock().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<TaskCheckpoint>> {
        self.checkpoints.lock().values().cloned().collect()
    }
}
