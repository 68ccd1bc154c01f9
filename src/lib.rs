//! Event-driven business metric counters over a scoped key-value store.
//!
//! Counters are declared once, react to entity lifecycle events delivered
//! by the host persistence layer, and maintain their values directly in
//! the store, with no separate analytics database or batch pipeline:
//!
//! - **Increment counters** collect tokens in sets, bucketed per scope
//!   and per month plus global/all-time buckets, with optional
//!   identity-based deduplication that reference-counts contributing
//!   entities so decrement-on-destroy stays correct.
//! - **Aggregate counters** collect numeric values in lists and answer
//!   sum/average queries.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tally::{CounterDef, Engine, EngineConfig, Lifecycle, MemoryStore, Snapshot};
//!
//! let engine = Engine::new(EngineConfig::new(Arc::new(MemoryStore::new())));
//! engine.define(
//!     CounterDef::increment("signups")
//!         .on("user", Lifecycle::Create)
//!         .build(),
//! )?;
//!
//! let snapshot = Snapshot::try_from(serde_json::json!({
//!     "id": 1, "created_at": "2024-03-05T10:00:00Z",
//! }))?;
//! engine.notify("user", Lifecycle::Create, snapshot)?;
//! assert_eq!(engine.size("signups", None, None)?, 1);
//! # Ok::<(), tally::EngineError>(())
//! ```

pub mod config;
pub mod context;
pub mod counter;
pub mod dedup;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod key;
pub mod month;
pub mod processor;
pub mod query;
pub mod registry;
pub mod store;
pub mod worker;

pub use config::EngineConfig;
pub use context::{EventContext, Lifecycle, ScopeRef, Snapshot};
pub use counter::{CounterDef, CounterDefBuilder, CounterKind, EventBinding};
pub use engine::Engine;
pub use error::EngineError;
pub use key::CounterKey;
pub use month::Month;
pub use store::{MemoryStore, Store};
pub use worker::{DeferredJob, JobQueue, QueueReceiver, QueueWorker, TokioJobQueue};
