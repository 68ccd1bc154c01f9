//! Event execution: the fan-out write algorithm.
//!
//! One execution performs exactly one action (increment, decrement or
//! append) replicated across every relevant bucket: the cross product of
//! {event month, all-time} and {each resolved scope, global}. Keys are
//! written in that deterministic order, months outer, scopes inner. No
//! transaction spans the fan-out; a crash mid-write leaves some buckets
//! updated and others not, which the store-level atomicity of each single
//! primitive does not repair.

use crate::context::EventContext;
use crate::counter::{CounterDef, CounterKind};
use crate::dedup::DedupIndex;
use crate::error::EngineError;
use crate::key::CounterKey;
use crate::store::Store;
use std::sync::Arc;
use tracing::debug;

/// Action selected for one execution.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Action {
    Increment,
    Decrement,
    Append(f64),
}

/// Executes counter actions against the store. Shared by the dispatcher
/// (inline path) and the deferred-job runner.
pub struct EventProcessor {
    store: Arc<dyn Store>,
}

impl EventProcessor {
    pub fn new(store: Arc<dyn Store>) -> Self {
        EventProcessor { store }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Run the counter's action for this event. Evaluates the
    /// execution-time gate first; this is where a deferred job lands, and
    /// inline execution goes through the same gate.
    pub fn execute(&self, def: &CounterDef, ctx: &EventContext) -> Result<(), EngineError> {
        if !def.if_async(ctx)? {
            debug!(counter = def.name(), "skipped by execution-time predicate");
            return Ok(());
        }
        let action = match def.kind() {
            CounterKind::Aggregate => Action::Append(def.value(ctx)?),
            CounterKind::Increment if def.decrements(ctx)? => Action::Decrement,
            CounterKind::Increment => Action::Increment,
        };
        self.run(def, ctx, action)
    }

    /// Destroy path: forced decrement, same fan-out, same execution-time
    /// gate. Callers have already checked the counter kind and the
    /// decrement-on-destroy flag.
    pub fn execute_destroy(&self, def: &CounterDef, ctx: &EventContext) -> Result<(), EngineError> {
        debug_assert!(def.kind() == CounterKind::Increment);
        if !def.if_async(ctx)? {
            debug!(counter = def.name(), "skipped by execution-time predicate");
            return Ok(());
        }
        self.run(def, ctx, Action::Decrement)
    }

    fn run(&self, def: &CounterDef, ctx: &EventContext, action: Action) -> Result<(), EngineError> {
        let month = def.month(ctx)?;
        let scopes = ctx.scopes(def)?;
        debug!(
            counter = def.name(),
            lifecycle = %ctx.lifecycle(),
            ?action,
            month = %month,
            scope_count = scopes.len(),
            "executing"
        );

        for month in [Some(month), None] {
            for scope in scopes.iter().map(Some).chain([None]) {
                let key = CounterKey::build(def.name(), scope, month, None);
                match action {
                    Action::Increment => self.increment(def, ctx, &key)?,
                    Action::Decrement => self.decrement(def, ctx, &key)?,
                    Action::Append(value) => self.append(&key, value)?,
                }
            }
        }
        Ok(())
    }

    /// Add the token to the bucket's set; with an identity extractor, also
    /// record which entity contributed it.
    fn increment(
        &self,
        def: &CounterDef,
        ctx: &EventContext,
        key: &CounterKey,
    ) -> Result<(), EngineError> {
        let token = def.token(ctx)?;
        self.store.set_add(&key.encode(), &token)?;
        if def.has_identity() {
            DedupIndex::new(self.store.as_ref()).track(key, &token, &ctx.entity_id()?)?;
        }
        Ok(())
    }

    /// Remove the token from the bucket's set. With an identity extractor
    /// the token only goes once its last contributing entity is released.
    fn decrement(
        &self,
        def: &CounterDef,
        ctx: &EventContext,
        key: &CounterKey,
    ) -> Result<(), EngineError> {
        let token = def.token(ctx)?;
        if def.has_identity() {
            let unreferenced =
                DedupIndex::new(self.store.as_ref()).release(key, &token, &ctx.entity_id()?)?;
            if !unreferenced {
                return Ok(());
            }
        }
        self.store.set_remove(&key.encode(), &token)?;
        Ok(())
    }

    fn append(&self, key: &CounterKey, value: f64) -> Result<(), EngineError> {
        self.store.list_push(&key.encode(), &value.to_string())?;
        Ok(())
    }
}
