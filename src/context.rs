//! Per-event execution context.
//!
//! The host delivers each lifecycle transition as a flat attribute
//! `Snapshot`. An `EventContext` wraps one snapshot for one triggered
//! counter: predicates and extractors read it, and scope handles are
//! resolved lazily, at most once, when the write fan-out needs them.

use crate::counter::CounterDef;
use crate::error::EngineError;
use crate::month::Month;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::OnceCell;
use std::fmt;

/// Kind of lifecycle transition an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lifecycle {
    Create,
    Update,
    Destroy,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Create => "create",
            Lifecycle::Update => "update",
            Lifecycle::Destroy => "destroy",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved handle of a scope entity (e.g. an organisation) under which a
/// counter tracks values independently of the global bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeRef {
    kind: String,
    id: String,
    created_at: Option<DateTime<Utc>>,
}

impl ScopeRef {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        ScopeRef {
            kind: kind.into(),
            id: id.into(),
            created_at: None,
        }
    }

    /// Attach the scope's creation time; the monthly series query uses it
    /// as the default window start.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}

/// Flat field-name to scalar-value mapping delivered by the host for each
/// committed transition. Must carry the entity's primary `id` and its
/// `created_at` timestamp (RFC 3339 string or epoch seconds).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot(Map<String, Value>);

impl Snapshot {
    pub fn new(fields: Map<String, Value>) -> Self {
        Snapshot(fields)
    }

    /// Build from any JSON object value. Rejects non-objects.
    pub fn from_value(value: Value) -> Result<Self, EngineError> {
        match value {
            Value::Object(fields) => Ok(Snapshot(fields)),
            other => Err(EngineError::Predicate(format!(
                "attribute snapshot must be a flat object, got {}",
                other
            ))),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// String view of a field; numbers are rendered, other types are absent.
    pub fn str_field(&self, field: &str) -> Option<String> {
        match self.0.get(field) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn i64_field(&self, field: &str) -> Option<i64> {
        self.0.get(field).and_then(Value::as_i64)
    }

    pub fn f64_field(&self, field: &str) -> Option<f64> {
        self.0.get(field).and_then(Value::as_f64)
    }

    pub fn bool_field(&self, field: &str) -> Option<bool> {
        self.0.get(field).and_then(Value::as_bool)
    }

    /// The entity's primary identifier, rendered as a token.
    pub fn id(&self) -> Result<String, EngineError> {
        self.str_field("id")
            .ok_or_else(|| EngineError::Predicate("snapshot is missing the `id` field".to_string()))
    }

    /// The entity's creation timestamp. Accepts RFC 3339 strings or epoch
    /// seconds, the two shapes host adapters deliver.
    pub fn created_at(&self) -> Result<DateTime<Utc>, EngineError> {
        match self.0.get("created_at") {
            Some(Value::String(raw)) => DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    EngineError::Predicate(format!("unparseable `created_at` `{}`: {}", raw, e))
                }),
            Some(Value::Number(n)) => {
                let secs = n.as_i64().ok_or_else(|| {
                    EngineError::Predicate(format!("unparseable `created_at` {}", n))
                })?;
                Utc.timestamp_opt(secs, 0).single().ok_or_else(|| {
                    EngineError::Predicate(format!("`created_at` {} is out of range", secs))
                })
            }
            _ => Err(EngineError::Predicate(
                "snapshot is missing the `created_at` field".to_string(),
            )),
        }
    }
}

impl TryFrom<Value> for Snapshot {
    type Error = EngineError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Snapshot::from_value(value)
    }
}

/// Transient context for one triggered counter: built per event, used for
/// exactly one action, then discarded.
pub struct EventContext {
    lifecycle: Lifecycle,
    snapshot: Snapshot,
    scopes: OnceCell<Vec<ScopeRef>>,
}

impl EventContext {
    pub fn new(lifecycle: Lifecycle, snapshot: Snapshot) -> Self {
        EventContext {
            lifecycle,
            snapshot,
            scopes: OnceCell::new(),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Primary id of the originating entity.
    pub fn entity_id(&self) -> Result<String, EngineError> {
        self.snapshot.id()
    }

    /// Month bucket of the snapshot's creation timestamp.
    pub fn created_month(&self) -> Result<Month, EngineError> {
        Ok(Month::of(&self.snapshot.created_at()?))
    }

    /// Scope handles for the fan-out, resolved at most once per context.
    pub fn scopes(&self, def: &CounterDef) -> Result<&[ScopeRef], EngineError> {
        if let Some(resolved) = self.scopes.get() {
            return Ok(resolved.as_slice());
        }
        let resolved = def.resolve_scopes(self)?;
        Ok(self.scopes.get_or_init(|| resolved).as_slice())
    }
}
