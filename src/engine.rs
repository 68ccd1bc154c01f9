//! Engine facade.
//!
//! Ties the registry, dispatcher and query executor together behind one
//! handle: define counters at startup, feed lifecycle events from the
//! host's commit hooks, query values and series, reset, backfill.

use crate::config::EngineConfig;
use crate::context::{EventContext, Lifecycle, ScopeRef, Snapshot};
use crate::counter::CounterDef;
use crate::dispatcher::{EventDispatcher, JobRunner};
use crate::error::EngineError;
use crate::key::CounterKey;
use crate::month::Month;
use crate::processor::EventProcessor;
use crate::query::QueryExecutor;
use crate::registry::CounterRegistry;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::info;

use std::sync::Arc;

pub struct Engine {
    registry: Arc<CounterRegistry>,
    processor: Arc<EventProcessor>,
    dispatcher: EventDispatcher,
    query: QueryExecutor,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let registry = Arc::new(CounterRegistry::new());
        let processor = Arc::new(EventProcessor::new(config.store.clone()));
        let dispatcher =
            EventDispatcher::new(registry.clone(), processor.clone(), config.queue.clone());
        let query = QueryExecutor::new(registry.clone(), config.store);
        Engine {
            registry,
            processor,
            dispatcher,
            query,
        }
    }

    /// Register a counter definition. Overwrites any previous definition
    /// under the same name.
    pub fn define(&self, def: CounterDef) -> Result<(), EngineError> {
        info!(counter = def.name(), "registering counter");
        self.registry.register(def)
    }

    /// Deliver one committed lifecycle transition.
    pub fn notify(
        &self,
        entity_type: &str,
        lifecycle: Lifecycle,
        snapshot: Snapshot,
    ) -> Result<(), EngineError> {
        self.dispatcher.notify(entity_type, lifecycle, snapshot)
    }

    /// Execution handle for deferred-queue consumers.
    pub fn job_runner(&self) -> JobRunner {
        JobRunner::new(self.registry.clone(), self.processor.clone())
    }

    /// Manually run a counter's increment/append path for one entity
    /// outside the live event stream; used to populate counters for
    /// pre-existing data. With `skip_validation` false the commit-time
    /// predicate still gates; note that fields only present on genuine
    /// update events will be absent from the snapshot.
    pub fn backfill(
        &self,
        name: &str,
        snapshot: Snapshot,
        skip_validation: bool,
    ) -> Result<(), EngineError> {
        let def = self.registry.lookup(name)?;
        let ctx = EventContext::new(Lifecycle::Create, snapshot);
        if !skip_validation && !def.should_run(&ctx)? {
            return Ok(());
        }
        self.processor.execute(&def, &ctx)
    }

    pub fn value(
        &self,
        name: &str,
        scope: Option<&ScopeRef>,
        month: Option<Month>,
    ) -> Result<f64, EngineError> {
        self.query.value(name, scope, month)
    }

    pub fn size(
        &self,
        name: &str,
        scope: Option<&ScopeRef>,
        month: Option<Month>,
    ) -> Result<usize, EngineError> {
        self.query.size(name, scope, month)
    }

    pub fn sum(
        &self,
        name: &str,
        scope: Option<&ScopeRef>,
        month: Option<Month>,
    ) -> Result<f64, EngineError> {
        self.query.sum(name, scope, month)
    }

    pub fn average(
        &self,
        name: &str,
        scope: Option<&ScopeRef>,
        month: Option<Month>,
    ) -> Result<f64, EngineError> {
        self.query.average(name, scope, month)
    }

    pub fn members(
        &self,
        name: &str,
        scope: Option<&ScopeRef>,
        month: Option<Month>,
    ) -> Result<Vec<String>, EngineError> {
        self.query.members(name, scope, month)
    }

    pub fn entries(
        &self,
        name: &str,
        scope: Option<&ScopeRef>,
        month: Option<Month>,
    ) -> Result<Vec<String>, EngineError> {
        self.query.entries(name, scope, month)
    }

    pub fn values_grouped_by_month(
        &self,
        name: &str,
        scope: Option<&ScopeRef>,
        start_at: Option<DateTime<Utc>>,
        stop_at: Option<DateTime<Utc>>,
    ) -> Result<BTreeMap<String, f64>, EngineError> {
        self.query
            .values_grouped_by_month(name, scope, start_at, stop_at)
    }

    pub fn all_keys(
        &self,
        name: &str,
        scope: Option<&ScopeRef>,
        month: Option<Month>,
    ) -> Result<Vec<CounterKey>, EngineError> {
        self.query.all_keys(name, scope, month)
    }

    pub fn reset(
        &self,
        name: &str,
        scope: Option<&ScopeRef>,
        month: Option<Month>,
    ) -> Result<(), EngineError> {
        self.query.reset(name, scope, month)
    }
}
