//! Counter value queries.
//!
//! Reads are bucket-local: cardinality for increment counters, sum and
//! average for aggregate counters, plus the monthly series and the scan
//! driven reset. Every operation resolves the counter name first and
//! fails with a configuration error for unknown names.

use crate::context::ScopeRef;
use crate::counter::CounterKind;
use crate::error::EngineError;
use crate::key::CounterKey;
use crate::month::Month;
use crate::registry::CounterRegistry;
use crate::store::Store;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Default series window when neither a start date nor a scope creation
/// time is known: trailing months ending at the current month.
const DEFAULT_WINDOW_MONTHS: u32 = 24;

pub struct QueryExecutor {
    registry: Arc<CounterRegistry>,
    store: Arc<dyn Store>,
}

impl QueryExecutor {
    pub fn new(registry: Arc<CounterRegistry>, store: Arc<dyn Store>) -> Self {
        QueryExecutor { registry, store }
    }

    fn bucket(&self, name: &str, scope: Option<&ScopeRef>, month: Option<Month>) -> String {
        CounterKey::build(name, scope, month, None).encode()
    }

    /// Cardinality of the bucket's token set.
    pub fn size(
        &self,
        name: &str,
        scope: Option<&ScopeRef>,
        month: Option<Month>,
    ) -> Result<usize, EngineError> {
        self.registry.lookup(name)?;
        self.store.set_len(&self.bucket(name, scope, month))
    }

    /// Sum of the bucket's stored values; 0 when empty. Entries that do
    /// not parse as numbers count as zero.
    pub fn sum(
        &self,
        name: &str,
        scope: Option<&ScopeRef>,
        month: Option<Month>,
    ) -> Result<f64, EngineError> {
        self.registry.lookup(name)?;
        let values = self.store.list_range(&self.bucket(name, scope, month))?;
        Ok(values
            .iter()
            .map(|v| v.parse::<f64>().unwrap_or_default())
            .sum())
    }

    /// Average of the bucket's stored values; 0 when empty.
    pub fn average(
        &self,
        name: &str,
        scope: Option<&ScopeRef>,
        month: Option<Month>,
    ) -> Result<f64, EngineError> {
        self.registry.lookup(name)?;
        let values = self.store.list_range(&self.bucket(name, scope, month))?;
        if values.is_empty() {
            return Ok(0.0);
        }
        let sum: f64 = values
            .iter()
            .map(|v| v.parse::<f64>().unwrap_or_default())
            .sum();
        Ok(sum / values.len() as f64)
    }

    /// The counter's value for one bucket: average for aggregate
    /// counters, set cardinality otherwise.
    pub fn value(
        &self,
        name: &str,
        scope: Option<&ScopeRef>,
        month: Option<Month>,
    ) -> Result<f64, EngineError> {
        let def = self.registry.lookup(name)?;
        match def.kind() {
            CounterKind::Aggregate => self.average(name, scope, month),
            CounterKind::Increment => Ok(self.size(name, scope, month)? as f64),
        }
    }

    /// Raw tokens of one bucket's set.
    pub fn members(
        &self,
        name: &str,
        scope: Option<&ScopeRef>,
        month: Option<Month>,
    ) -> Result<Vec<String>, EngineError> {
        self.registry.lookup(name)?;
        self.store.set_members(&self.bucket(name, scope, month))
    }

    /// Raw stored values of one aggregate bucket, in append order.
    pub fn entries(
        &self,
        name: &str,
        scope: Option<&ScopeRef>,
        month: Option<Month>,
    ) -> Result<Vec<String>, EngineError> {
        self.registry.lookup(name)?;
        self.store.list_range(&self.bucket(name, scope, month))
    }

    /// Month label → value over a window, chronological, each value
    /// rounded to two decimals.
    ///
    /// The window starts at `start_at`'s month, else the scope's creation
    /// month, else `DEFAULT_WINDOW_MONTHS` back; it always ends at the
    /// current month. Months at or after `stop_at` are excluded.
    pub fn values_grouped_by_month(
        &self,
        name: &str,
        scope: Option<&ScopeRef>,
        start_at: Option<DateTime<Utc>>,
        stop_at: Option<DateTime<Utc>>,
    ) -> Result<BTreeMap<String, f64>, EngineError> {
        self.registry.lookup(name)?;
        let current = Month::current();
        let start = start_at
            .map(|dt| Month::of(&dt))
            .or_else(|| scope.and_then(ScopeRef::created_at).map(|dt| Month::of(&dt)))
            .unwrap_or_else(|| current.months_back(DEFAULT_WINDOW_MONTHS));
        let stop = stop_at.map(|dt| Month::of(&dt));

        let mut series = BTreeMap::new();
        for month in start.through(current) {
            if let Some(stop) = stop {
                if month >= stop {
                    continue;
                }
            }
            let value = self.value(name, scope, Some(month))?;
            series.insert(month.label(), round2(value));
        }
        Ok(series)
    }

    /// Decoded keys of every stored bucket of a counter, optionally
    /// narrowed by scope and month. Instance-tracking keys are included;
    /// this is the traversal `reset` deletes.
    pub fn all_keys(
        &self,
        name: &str,
        scope: Option<&ScopeRef>,
        month: Option<Month>,
    ) -> Result<Vec<CounterKey>, EngineError> {
        self.registry.lookup(name)?;
        Ok(self
            .matching_raw_keys(name, scope, month)?
            .into_iter()
            .map(|(_, key)| key)
            .collect())
    }

    /// Delete every stored bucket of a counter, optionally narrowed by
    /// scope and month.
    pub fn reset(
        &self,
        name: &str,
        scope: Option<&ScopeRef>,
        month: Option<Month>,
    ) -> Result<(), EngineError> {
        self.registry.lookup(name)?;
        let matches = self.matching_raw_keys(name, scope, month)?;
        debug!(counter = name, keys = matches.len(), "resetting");
        for (raw, _) in matches {
            self.store.delete(&raw)?;
        }
        Ok(())
    }

    fn matching_raw_keys(
        &self,
        name: &str,
        scope: Option<&ScopeRef>,
        month: Option<Month>,
    ) -> Result<Vec<(String, CounterKey)>, EngineError> {
        let candidates = self.store.scan(&CounterKey::scan_fragment(name))?;
        Ok(candidates
            .into_iter()
            .filter_map(|raw| CounterKey::decode(&raw).map(|key| (raw, key)))
            .filter(|(_, key)| key.counter == name && key.matches(scope, month))
            .collect())
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
