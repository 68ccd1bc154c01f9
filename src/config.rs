//! Engine configuration.
//!
//! Everything the engine needs is handed in explicitly at construction:
//! the storage handle and, optionally, the deferred-execution queue.
//! Built once at process start, read-only afterwards.

use crate::store::Store;
use crate::worker::JobQueue;
use std::sync::Arc;

#[derive(Clone)]
pub struct EngineConfig {
    /// Shared key-value store handle; all executions write through it.
    pub store: Arc<dyn Store>,
    /// Deferred-execution queue. When absent, create/update events run
    /// inline within the dispatching call.
    pub queue: Option<Arc<dyn JobQueue>>,
}

impl EngineConfig {
    pub fn new(store: Arc<dyn Store>) -> Self {
        EngineConfig { store, queue: None }
    }

    pub fn with_queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.queue = Some(queue);
        self
    }
}
