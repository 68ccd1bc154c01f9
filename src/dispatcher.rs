//! Lifecycle event dispatch.
//!
//! `notify` is called once per committed transition of a tracked entity.
//! For each counter bound to the event it gates on the commit-time
//! predicate, then routes: destroys run synchronously inside the dispatch
//! call (entity lookups may stop succeeding right after the commit),
//! creates and updates run inline when no queue is configured or the
//! counter is marked inline, otherwise they are enqueued for deferred
//! execution (at-least-once, unordered).

use crate::context::{EventContext, Lifecycle, Snapshot};
use crate::counter::{CounterDef, CounterKind};
use crate::error::EngineError;
use crate::processor::EventProcessor;
use crate::registry::CounterRegistry;
use crate::worker::{DeferredJob, JobQueue};
use std::sync::Arc;
use tracing::{debug, error};

pub struct EventDispatcher {
    registry: Arc<CounterRegistry>,
    processor: Arc<EventProcessor>,
    queue: Option<Arc<dyn JobQueue>>,
}

impl EventDispatcher {
    pub fn new(
        registry: Arc<CounterRegistry>,
        processor: Arc<EventProcessor>,
        queue: Option<Arc<dyn JobQueue>>,
    ) -> Self {
        EventDispatcher {
            registry,
            processor,
            queue,
        }
    }

    /// Deliver one committed lifecycle transition to every bound counter.
    ///
    /// A failing counter does not stop the others; the first error is
    /// returned after all bound counters have been offered the event.
    pub fn notify(
        &self,
        entity_type: &str,
        lifecycle: Lifecycle,
        snapshot: Snapshot,
    ) -> Result<(), EngineError> {
        let mut first_error = None;
        for def in self.registry.defs_for(entity_type, lifecycle) {
            if let Err(err) = self.dispatch_one(&def, lifecycle, snapshot.clone()) {
                error!(counter = def.name(), %err, "dispatch failed");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn dispatch_one(
        &self,
        def: &CounterDef,
        lifecycle: Lifecycle,
        snapshot: Snapshot,
    ) -> Result<(), EngineError> {
        let ctx = EventContext::new(lifecycle, snapshot);
        if !def.should_run(&ctx)? {
            debug!(counter = def.name(), %lifecycle, "skipped by predicate");
            return Ok(());
        }

        if lifecycle == Lifecycle::Destroy {
            // Aggregate counters have nothing to undo on destroy.
            if def.kind() == CounterKind::Increment && def.decrement_on_destroy() {
                return self.processor.execute_destroy(def, &ctx);
            }
            return Ok(());
        }

        match &self.queue {
            Some(queue) if !def.runs_inline() => {
                debug!(counter = def.name(), %lifecycle, "deferring execution");
                queue.enqueue(DeferredJob {
                    counter: def.name().to_string(),
                    lifecycle,
                    snapshot: ctx.snapshot().clone(),
                })
            }
            _ => self.processor.execute(def, &ctx),
        }
    }
}

/// The execution half of dispatch, packaged for deferred consumers: a
/// queue worker (or an external task system's consumer) resolves the
/// counter by name and runs the action, which re-evaluates the
/// execution-time predicate.
#[derive(Clone)]
pub struct JobRunner {
    registry: Arc<CounterRegistry>,
    processor: Arc<EventProcessor>,
}

impl JobRunner {
    pub fn new(registry: Arc<CounterRegistry>, processor: Arc<EventProcessor>) -> Self {
        JobRunner {
            registry,
            processor,
        }
    }

    pub fn run(&self, job: DeferredJob) -> Result<(), EngineError> {
        let def = self.registry.lookup(&job.counter)?;
        let ctx = EventContext::new(job.lifecycle, job.snapshot);
        self.processor.execute(&def, &ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::CounterKey;
    use crate::store::{MemoryStore, Store};
    use parking_lot::Mutex;
    use serde_json::json;

    fn snapshot(value: serde_json::Value) -> Snapshot {
        Snapshot::try_from(value).unwrap()
    }

    fn setup(defs: Vec<CounterDef>) -> (EventDispatcher, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(CounterRegistry::new());
        for def in defs {
            registry.register(def).unwrap();
        }
        let processor = Arc::new(EventProcessor::new(store.clone()));
        (EventDispatcher::new(registry, processor, None), store)
    }

    fn all_time(counter: &str) -> String {
        CounterKey::build(counter, None, None, None).encode()
    }

    #[test]
    fn test_notify_runs_bound_counters_inline() {
        let (dispatcher, store) = setup(vec![
            CounterDef::increment("signups")
                .on("user", Lifecycle::Create)
                .build(),
            CounterDef::increment("invoices")
                .on("invoice", Lifecycle::Create)
                .build(),
        ]);

        dispatcher
            .notify(
                "user",
                Lifecycle::Create,
                snapshot(json!({"id": 1, "created_at": "2024-03-05T00:00:00Z"})),
            )
            .unwrap();

        assert_eq!(store.set_len(&all_time("signups")).unwrap(), 1);
        assert_eq!(store.set_len(&all_time("invoices")).unwrap(), 0);
    }

    #[test]
    fn test_predicate_gate_blocks_everything() {
        let (dispatcher, store) = setup(vec![CounterDef::increment("signups")
            .on("user", Lifecycle::Create)
            .on("user", Lifecycle::Destroy)
            .when(|_| Ok(false))
            .build()]);

        for lifecycle in [Lifecycle::Create, Lifecycle::Destroy] {
            dispatcher
                .notify(
                    "user",
                    lifecycle,
                    snapshot(json!({"id": 1, "created_at": "2024-03-05T00:00:00Z"})),
                )
                .unwrap();
        }
        assert_eq!(store.set_len(&all_time("signups")).unwrap(), 0);
    }

    #[test]
    fn test_destroy_decrements_increment_counters_only() {
        let (dispatcher, store) = setup(vec![
            CounterDef::increment("signups")
                .on("user", Lifecycle::Create)
                .on("user", Lifecycle::Destroy)
                .build(),
            CounterDef::aggregate("salaries")
                .on("user", Lifecycle::Create)
                .on("user", Lifecycle::Destroy)
                .value(|ctx| {
                    ctx.snapshot()
                        .f64_field("salary")
                        .ok_or_else(|| EngineError::Predicate("missing salary".into()))
                })
                .build(),
        ]);
        let snap = json!({"id": 1, "salary": 2000, "created_at": "2024-03-05T00:00:00Z"});

        dispatcher
            .notify("user", Lifecycle::Create, snapshot(snap.clone()))
            .unwrap();
        dispatcher
            .notify("user", Lifecycle::Destroy, snapshot(snap))
            .unwrap();

        assert_eq!(store.set_len(&all_time("signups")).unwrap(), 0);
        // The aggregate's list is untouched by the destroy.
        assert_eq!(store.list_range(&all_time("salaries")).unwrap().len(), 1);
    }

    #[test]
    fn test_destroy_respects_decrement_on_destroy_flag() {
        let (dispatcher, store) = setup(vec![CounterDef::increment("signups")
            .on("user", Lifecycle::Create)
            .on("user", Lifecycle::Destroy)
            .decrement_on_destroy(false)
            .build()]);
        let snap = json!({"id": 1, "created_at": "2024-03-05T00:00:00Z"});

        dispatcher
            .notify("user", Lifecycle::Create, snapshot(snap.clone()))
            .unwrap();
        dispatcher
            .notify("user", Lifecycle::Destroy, snapshot(snap))
            .unwrap();

        assert_eq!(store.set_len(&all_time("signups")).unwrap(), 1);
    }

    #[test]
    fn test_one_failing_counter_does_not_stop_others() {
        let (dispatcher, store) = setup(vec![
            CounterDef::increment("a_broken")
                .on("user", Lifecycle::Create)
                .when(|_| Err(EngineError::Predicate("boom".into())))
                .build(),
            CounterDef::increment("b_healthy")
                .on("user", Lifecycle::Create)
                .build(),
        ]);

        let result = dispatcher.notify(
            "user",
            Lifecycle::Create,
            snapshot(json!({"id": 1, "created_at": "2024-03-05T00:00:00Z"})),
        );

        assert!(matches!(result, Err(EngineError::Predicate(_))));
        assert_eq!(store.set_len(&all_time("b_healthy")).unwrap(), 1);
    }

    #[test]
    fn test_create_is_enqueued_when_queue_configured() {
        struct RecordingQueue(Mutex<Vec<DeferredJob>>);
        impl JobQueue for RecordingQueue {
            fn enqueue(&self, job: DeferredJob) -> Result<(), EngineError> {
                self.0.lock().push(job);
                Ok(())
            }
        }

        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(CounterRegistry::new());
        registry
            .register(
                CounterDef::increment("signups")
                    .on("user", Lifecycle::Create)
                    .on("user", Lifecycle::Destroy)
                    .build(),
            )
            .unwrap();
        let processor = Arc::new(EventProcessor::new(store.clone()));
        let queue = Arc::new(RecordingQueue(Mutex::new(Vec::new())));
        let dispatcher = EventDispatcher::new(registry, processor, Some(queue.clone()));

        let snap = json!({"id": 1, "created_at": "2024-03-05T00:00:00Z"});
        dispatcher
            .notify("user", Lifecycle::Create, snapshot(snap.clone()))
            .unwrap();

        // Nothing written inline; the job carries everything needed later.
        assert_eq!(store.set_len(&all_time("signups")).unwrap(), 0);
        let jobs = queue.0.lock();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].counter, "signups");
        assert_eq!(jobs[0].lifecycle, Lifecycle::Create);

        drop(jobs);

        // Destroys bypass the queue and run synchronously.
        dispatcher
            .notify("user", Lifecycle::Destroy, snapshot(snap))
            .unwrap();
        assert_eq!(queue.0.lock().len(), 1);
    }

    #[test]
    fn test_inline_counter_bypasses_queue() {
        struct RejectingQueue;
        impl JobQueue for RejectingQueue {
            fn enqueue(&self, _job: DeferredJob) -> Result<(), EngineError> {
                panic!("inline counter must not be enqueued");
            }
        }

        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(CounterRegistry::new());
        registry
            .register(
                CounterDef::increment("signups")
                    .on("user", Lifecycle::Create)
                    .inline()
                    .build(),
            )
            .unwrap();
        let processor = Arc::new(EventProcessor::new(store.clone()));
        let dispatcher = EventDispatcher::new(registry, processor, Some(Arc::new(RejectingQueue)));

        dispatcher
            .notify(
                "user",
                Lifecycle::Create,
                snapshot(json!({"id": 1, "created_at": "2024-03-05T00:00:00Z"})),
            )
            .unwrap();

        assert_eq!(store.set_len(&all_time("signups")).unwrap(), 1);
    }

    #[test]
    fn test_job_runner_executes_deferred_jobs() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(CounterRegistry::new());
        registry
            .register(
                CounterDef::increment("signups")
                    .on("user", Lifecycle::Create)
                    .build(),
            )
            .unwrap();
        let processor = Arc::new(EventProcessor::new(store.clone()));
        let runner = JobRunner::new(registry, processor);

        runner
            .run(DeferredJob {
                counter: "signups".to_string(),
                lifecycle: Lifecycle::Create,
                snapshot: snapshot(json!({"id": 1, "created_at": "2024-03-05T00:00:00Z"})),
            })
            .unwrap();

        assert_eq!(store.set_len(&all_time("signups")).unwrap(), 1);
    }

    #[test]
    fn test_job_runner_rejects_unknown_counter() {
        let runner = JobRunner::new(
            Arc::new(CounterRegistry::new()),
            Arc::new(EventProcessor::new(Arc::new(MemoryStore::new()))),
        );
        let result = runner.run(DeferredJob {
            counter: "ghost".to_string(),
            lifecycle: Lifecycle::Create,
            snapshot: snapshot(json!({"id": 1})),
        });
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }
}
