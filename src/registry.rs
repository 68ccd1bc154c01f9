//! Name-keyed counter registry.
//!
//! Registration is append-only and happens before event traffic in normal
//! operation; re-registering a name overwrites, which backfill tooling and
//! tests rely on.

use crate::context::Lifecycle;
use crate::counter::CounterDef;
use crate::error::EngineError;
use ahash::AHashMap;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Default)]
pub struct CounterRegistry {
    defs: RwLock<AHashMap<String, Arc<CounterDef>>>,
}

impl CounterRegistry {
    pub fn new() -> Self {
        CounterRegistry {
            defs: RwLock::new(AHashMap::new()),
        }
    }

    /// Validate and store a definition. Overwrites any previous definition
    /// under the same name.
    pub fn register(&self, def: CounterDef) -> Result<(), EngineError> {
        def.validate()?;
        self.defs
            .write()
            .insert(def.name().to_string(), Arc::new(def));
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<CounterDef>, EngineError> {
        self.defs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::unknown_counter(name))
    }

    /// Definitions bound to one `{entity, lifecycle}` event, in stable
    /// name order so fan-out across counters is deterministic per event.
    pub fn defs_for(&self, entity: &str, lifecycle: Lifecycle) -> Vec<Arc<CounterDef>> {
        let mut bound: Vec<Arc<CounterDef>> = self
            .defs
            .read()
            .values()
            .filter(|def| def.listens_to(entity, lifecycle))
            .cloned()
            .collect();
        bound.sort_by(|a, b| a.name().cmp(b.name()));
        bound
    }

    pub fn len(&self) -> usize {
        self.defs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.read().is_empty()
    }
}
