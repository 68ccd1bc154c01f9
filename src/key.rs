//! Counter key encoding.
//!
//! Every bucket a counter writes to is addressed by a `CounterKey`: the
//! counter name plus optional scope, month, and key-value dimensions.
//! The serialized form is a JSON object with a fixed field order, so the
//! same string works as the storage address and, decoded back, as the
//! filter during key scans (reset, enumeration).
//!
//! Absent scope means the global bucket; absent month means the all-time
//! bucket. Instance-tracking keys carry one extra `subject_id` dimension.

use crate::context::ScopeRef;
use crate::month::Month;
use serde::{Deserialize, Serialize};

/// Storage address of one counter bucket.
///
/// Field order is the canonical serialization order; do not reorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterKey {
    pub counter: String,
    pub scope_type: Option<String>,
    pub scope_id: Option<String>,
    pub month: Option<String>,
    pub key_value: Option<String>,
    /// Present only on instance-tracking keys (see `dedup`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
}

impl CounterKey {
    pub fn build(
        counter: &str,
        scope: Option<&ScopeRef>,
        month: Option<Month>,
        key_value: Option<&str>,
    ) -> Self {
        CounterKey {
            counter: counter.to_string(),
            scope_type: scope.map(|s| s.kind().to_string()),
            scope_id: scope.map(|s| s.id().to_string()),
            month: month.map(|m| m.label()),
            key_value: key_value.map(str::to_string),
            subject_id: None,
        }
    }

    /// The instance-tracking key for a deduplicated token within this bucket.
    pub fn instance(&self, token: &str) -> Self {
        let mut key = self.clone();
        key.subject_id = Some(token.to_string());
        key
    }

    /// Canonical string form, used verbatim as the storage key.
    pub fn encode(&self) -> String {
        // Serialization of a plain struct with no map fields cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse a stored key back into its fields. Returns `None` for keys
    /// that were not written by this engine.
    pub fn decode(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    /// Substring present in every encoded key of the named counter; used to
    /// pre-filter store scans before decoding candidates.
    pub fn scan_fragment(counter: &str) -> String {
        format!("\"counter\":{}", serde_json::Value::from(counter))
    }

    /// Whether this key addresses an instance-tracking entry.
    pub fn is_instance(&self) -> bool {
        self.subject_id.is_some()
    }

    /// Whether this key matches the given scope/month selector. `None`
    /// selector fields match anything, like the scan filters in `reset`.
    pub fn matches(&self, scope: Option<&ScopeRef>, month: Option<Month>) -> bool {
        let scope_matches = match scope {
            None => true,
            Some(s) => {
                self.scope_type.as_deref() == Some(s.kind())
                    && self.scope_id.as_deref() == Some(s.id())
            }
        };
        let month_matches = match month {
            None => true,
            Some(m) => self.month.as_deref() == Some(m.label().as_str()),
        };
        scope_matches && month_matches
    }
}
