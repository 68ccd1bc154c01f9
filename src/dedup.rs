//! Reference counting for deduplicated tokens.
//!
//! When a counter has an identity extractor, several entities can map to
//! the same token (e.g. two users sharing an organisation id). The main
//! set must keep that token until the *last* such entity is destroyed.
//! Each bucket therefore carries one instance-tracking key per token,
//! holding the raw entity ids that currently contribute to it.

use crate::error::EngineError;
use crate::key::CounterKey;
use crate::store::Store;

/// Instance-tracking index over one store handle.
pub struct DedupIndex<'a> {
    store: &'a dyn Store,
}

impl<'a> DedupIndex<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        DedupIndex { store }
    }

    /// Record that `entity_id` contributes to `token` within `bucket`.
    /// Idempotent per (bucket, token, entity).
    pub fn track(
        &self,
        bucket: &CounterKey,
        token: &str,
        entity_id: &str,
    ) -> Result<(), EngineError> {
        self.store
            .set_add(&bucket.instance(token).encode(), entity_id)?;
        Ok(())
    }

    /// Drop `entity_id`'s contribution to `token` within `bucket`.
    /// Returns true when no entity references the token any more, i.e.
    /// the caller may remove the token from the main set.
    pub fn release(
        &self,
        bucket: &CounterKey,
        token: &str,
        entity_id: &str,
    ) -> Result<bool, EngineError> {
        let instance_key = bucket.instance(token).encode();
        self.store.set_remove(&instance_key, entity_id)?;
        Ok(self.store.set_len(&instance_key)? == 0)
    }

    /// Remaining number of entities referencing `token` within `bucket`.
    pub fn references(&self, bucket: &CounterKey, token: &str) -> Result<usize, EngineError> {
        self.store.set_len(&bucket.instance(token).encode())
    }
}
