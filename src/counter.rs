//! Declarative counter definitions.
//!
//! A `CounterDef` is the immutable record behind one named counter: which
//! lifecycle events trigger it, whether it counts tokens or aggregates
//! numeric values, and the predicate/extractor closures evaluated against
//! each event's context. Definitions are created once at startup through
//! the builder and never mutated afterwards.

use crate::context::{EventContext, Lifecycle, ScopeRef};
use crate::error::EngineError;
use crate::month::Month;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Context → bool gate.
pub type Predicate = Arc<dyn Fn(&EventContext) -> Result<bool, EngineError> + Send + Sync>;
/// Context → token extractor (deduplication identifier).
pub type TokenFn = Arc<dyn Fn(&EventContext) -> Result<String, EngineError> + Send + Sync>;
/// Context → scope handles extractor.
pub type ScopesFn = Arc<dyn Fn(&EventContext) -> Result<Vec<ScopeRef>, EngineError> + Send + Sync>;
/// Context → numeric value extractor (aggregate counters).
pub type ValueFn = Arc<dyn Fn(&EventContext) -> Result<f64, EngineError> + Send + Sync>;
/// Context → month-override timestamp extractor.
pub type MonthFn =
    Arc<dyn Fn(&EventContext) -> Result<DateTime<Utc>, EngineError> + Send + Sync>;

/// Closed classification tag: how events turn into stored values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    /// Tokens accumulate in a set; the value is the set's cardinality.
    Increment,
    /// Numeric values accumulate in a list; the value is their average.
    Aggregate,
}

/// One `{entity type, lifecycle}` pair a counter listens to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventBinding {
    pub entity: String,
    pub lifecycle: Lifecycle,
}

impl EventBinding {
    pub fn new(entity: impl Into<String>, lifecycle: Lifecycle) -> Self {
        EventBinding {
            entity: entity.into(),
            lifecycle,
        }
    }
}

/// Immutable definition of one counter.
pub struct CounterDef {
    name: String,
    events: Vec<EventBinding>,
    kind: CounterKind,
    predicate: Option<Predicate>,
    async_predicate: Option<Predicate>,
    identify: Option<TokenFn>,
    scopes_of: Option<ScopesFn>,
    decrement_if: Option<Predicate>,
    decrement_on_destroy: bool,
    inline: bool,
    value_of: Option<ValueFn>,
    month_of: Option<MonthFn>,
}

impl fmt::Debug for CounterDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CounterDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("events", &self.events)
            .field("decrement_on_destroy", &self.decrement_on_destroy)
            .finish_non_exhaustive()
    }
}

impl CounterDef {
    /// Start defining an increment counter.
    pub fn increment(name: impl Into<String>) -> CounterDefBuilder {
        CounterDefBuilder::new(name.into(), CounterKind::Increment)
    }

    /// Start defining an aggregate counter.
    pub fn aggregate(name: impl Into<String>) -> CounterDefBuilder {
        CounterDefBuilder::new(name.into(), CounterKind::Aggregate)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CounterKind {
        self.kind
    }

    pub fn events(&self) -> &[EventBinding] {
        &self.events
    }

    pub fn listens_to(&self, entity: &str, lifecycle: Lifecycle) -> bool {
        self.events
            .iter()
            .any(|b| b.entity == entity && b.lifecycle == lifecycle)
    }

    pub fn decrement_on_destroy(&self) -> bool {
        self.decrement_on_destroy
    }

    /// Whether create/update events bypass a configured deferred queue.
    pub fn runs_inline(&self) -> bool {
        self.inline
    }

    pub fn has_identity(&self) -> bool {
        self.identify.is_some()
    }

    /// Commit-time gate; defaults to true.
    pub fn should_run(&self, ctx: &EventContext) -> Result<bool, EngineError> {
        match &self.predicate {
            Some(p) => p(ctx),
            None => Ok(true),
        }
    }

    /// Execution-time gate; defaults to true. Evaluated when the action
    /// actually runs, which may be later than `should_run` if deferred.
    pub fn if_async(&self, ctx: &EventContext) -> Result<bool, EngineError> {
        match &self.async_predicate {
            Some(p) => p(ctx),
            None => Ok(true),
        }
    }

    /// Whether this event should decrement instead of increment.
    pub fn decrements(&self, ctx: &EventContext) -> Result<bool, EngineError> {
        match &self.decrement_if {
            Some(p) => p(ctx),
            None => Ok(false),
        }
    }

    /// The counted token: the identity extractor's result, or failing that
    /// the entity's primary id.
    pub fn token(&self, ctx: &EventContext) -> Result<String, EngineError> {
        match &self.identify {
            Some(extract) => extract(ctx),
            None => ctx.entity_id(),
        }
    }

    /// Raw scope resolution; callers go through `EventContext::scopes`,
    /// which memoizes the result per context.
    pub fn resolve_scopes(&self, ctx: &EventContext) -> Result<Vec<ScopeRef>, EngineError> {
        match &self.scopes_of {
            Some(extract) => extract(ctx),
            None => Ok(Vec::new()),
        }
    }

    /// The numeric value appended by aggregate counters.
    pub fn value(&self, ctx: &EventContext) -> Result<f64, EngineError> {
        match &self.value_of {
            Some(extract) => extract(ctx),
            None => Err(EngineError::Configuration(format!(
                "counter `{}` has no value extractor",
                self.name
            ))),
        }
    }

    /// Month bucket for the event: the override extractor's result, or the
    /// snapshot's creation timestamp.
    pub fn month(&self, ctx: &EventContext) -> Result<Month, EngineError> {
        match &self.month_of {
            Some(extract) => Ok(Month::of(&extract(ctx)?)),
            None => ctx.created_month(),
        }
    }

    /// Registration-time validation.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.events.is_empty() {
            return Err(EngineError::Configuration(format!(
                "counter `{}` must declare at least one triggering event",
                self.name
            )));
        }
        if self.kind == CounterKind::Aggregate && self.value_of.is_none() {
            return Err(EngineError::Configuration(format!(
                "aggregate counter `{}` must declare a value extractor",
                self.name
            )));
        }
        Ok(())
    }
}

/// Builder for `CounterDef`; finished by `Engine::define` or
/// `CounterRegistry::register`.
pub struct CounterDefBuilder {
    def: CounterDef,
}

impl CounterDefBuilder {
    fn new(name: String, kind: CounterKind) -> Self {
        CounterDefBuilder {
            def: CounterDef {
                name,
                events: Vec::new(),
                kind,
                predicate: None,
                async_predicate: None,
                identify: None,
                scopes_of: None,
                decrement_if: None,
                decrement_on_destroy: kind == CounterKind::Increment,
                inline: false,
                value_of: None,
                month_of: None,
            },
        }
    }

    /// Add a triggering event. May be called repeatedly.
    pub fn on(mut self, entity: impl Into<String>, lifecycle: Lifecycle) -> Self {
        self.def.events.push(EventBinding::new(entity, lifecycle));
        self
    }

    /// Commit-time predicate (`should_run`).
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&EventContext) -> Result<bool, EngineError> + Send + Sync + 'static,
    {
        self.def.predicate = Some(Arc::new(predicate));
        self
    }

    /// Execution-time predicate (`if_async`).
    pub fn when_async<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&EventContext) -> Result<bool, EngineError> + Send + Sync + 'static,
    {
        self.def.async_predicate = Some(Arc::new(predicate));
        self
    }

    /// Deduplication identifier extractor.
    pub fn identify<F>(mut self, extract: F) -> Self
    where
        F: Fn(&EventContext) -> Result<String, EngineError> + Send + Sync + 'static,
    {
        self.def.identify = Some(Arc::new(extract));
        self
    }

    /// Scope handles extractor.
    pub fn scopes<F>(mut self, extract: F) -> Self
    where
        F: Fn(&EventContext) -> Result<Vec<ScopeRef>, EngineError> + Send + Sync + 'static,
    {
        self.def.scopes_of = Some(Arc::new(extract));
        self
    }

    /// Decrement instead of incrementing when the predicate holds.
    pub fn decrement_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&EventContext) -> Result<bool, EngineError> + Send + Sync + 'static,
    {
        self.def.decrement_if = Some(Arc::new(predicate));
        self
    }

    pub fn decrement_on_destroy(mut self, enabled: bool) -> Self {
        self.def.decrement_on_destroy = enabled;
        self
    }

    /// Run create/update events inside the dispatch call even when a
    /// deferred queue is configured. Destroys run inline regardless.
    pub fn inline(mut self) -> Self {
        self.def.inline = true;
        self
    }

    /// Numeric value extractor; required for aggregate counters.
    pub fn value<F>(mut self, extract: F) -> Self
    where
        F: Fn(&EventContext) -> Result<f64, EngineError> + Send + Sync + 'static,
    {
        self.def.value_of = Some(Arc::new(extract));
        self
    }

    /// Month-override extractor; defaults to the snapshot's `created_at`.
    pub fn month<F>(mut self, extract: F) -> Self
    where
        F: Fn(&EventContext) -> Result<DateTime<Utc>, EngineError> + Send + Sync + 'static,
    {
        self.def.month_of = Some(Arc::new(extract));
        self
    }

    pub fn build(self) -> CounterDef {
        self.def
    }
}
