//! In-memory fixture storage.
//!
//! Entities live in typed, insertion-ordered [`Collection`]s owned by the
//! [`FixtureStore`]. Collections only know about ids; relations between
//! kinds are resolved by the store's derived queries.

mod fixture_store;

pub use fixture_store::{FixtureStore, StoreCounts};

use crate::error::{StoreError, StoreResult};
use crate::models::{
    AnomalyDetection, AnomalyExplanation, BatchDetectionJob, CustomReporter, CustomValidator,
    HookRegistration, HotReloadConfig, MigrationHistory, Plugin, PluginLifecycle, Source,
    StorageTier, StreamingAlert, StreamingSession, TierPolicy, TieringConfig, TrustedSigner,
    VersionInfo,
};

/// A record addressable by a string id.
pub trait Entity {
    /// Name used in "not found" messages.
    const KIND: &'static str;

    /// The record's id.
    fn id(&self) -> &str;
}

macro_rules! entity {
    ($ty:ty, $kind:literal) => {
        entity!($ty, $kind, id);
    };
    ($ty:ty, $kind:literal, $field:ident) => {
        impl Entity for $ty {
            const KIND: &'static str = $kind;

            fn id(&self) -> &str {
                &self.$field
            }
        }
    };
}

entity!(Source, "Source");
entity!(Plugin, "Plugin");
entity!(PluginLifecycle, "Plugin lifecycle", plugin_id);
entity!(HotReloadConfig, "Hot reload config", plugin_id);
entity!(HookRegistration, "Hook");
entity!(TrustedSigner, "Signer");
entity!(CustomValidator, "Validator");
entity!(CustomReporter, "Reporter");
entity!(AnomalyDetection, "Detection");
entity!(AnomalyExplanation, "Explanation");
entity!(BatchDetectionJob, "Batch job");
entity!(StreamingSession, "Streaming session");
entity!(StreamingAlert, "Alert");
entity!(StorageTier, "Tier");
entity!(TierPolicy, "Policy");
entity!(TieringConfig, "Tiering config");
entity!(MigrationHistory, "Migration");
entity!(VersionInfo, "Version");

/// Insertion-ordered records of one kind with unique ids.
#[derive(Debug, Clone)]
pub struct Collection<T> {
    items: Vec<T>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Entity> Collection<T> {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record, oldest first.
    pub fn all(&self) -> &[T] {
        &self.items
    }

    /// Iterate over records, oldest first.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Look up a record.
    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    /// Look up a record that must exist.
    pub fn require(&self, id: &str) -> StoreResult<&T> {
        self.get(id).ok_or_else(|| not_found::<T>(id))
    }

    /// Mutable lookup.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.items.iter_mut().find(|item| item.id() == id)
    }

    /// Mutable lookup of a record that must exist.
    pub fn require_mut(&mut self, id: &str) -> StoreResult<&mut T> {
        self.get_mut(id).ok_or_else(|| not_found::<T>(id))
    }

    /// Whether a record with `id` exists.
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Append a record. Ids must be unique within the collection.
    pub fn add(&mut self, item: T) -> StoreResult<&T> {
        if self.contains(item.id()) {
            return Err(StoreError::DuplicateId {
                kind: T::KIND,
                id: item.id().to_string(),
            });
        }
        self.items.push(item);
        let last = self.items.len() - 1;
        Ok(&self.items[last])
    }

    /// Mutate a record in place and return whatever `f` returns.
    pub fn update<R>(&mut self, id: &str, f: impl FnOnce(&mut T) -> R) -> StoreResult<R> {
        self.require_mut(id).map(f)
    }

    /// Swap in a new version of a record, keeping its position.
    pub fn replace(&mut self, item: T) -> StoreResult<T> {
        let slot = self.require_mut(item.id())?;
        Ok(std::mem::replace(slot, item))
    }

    /// Delete a record.
    pub fn remove(&mut self, id: &str) -> StoreResult<T> {
        let index = self
            .items
            .iter()
            .position(|item| item.id() == id)
            .ok_or_else(|| not_found::<T>(id))?;
        Ok(self.items.remove(index))
    }

    /// Keep only records matching `keep`.
    pub fn retain(&mut self, keep: impl FnMut(&T) -> bool) {
        self.items.retain(keep);
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn not_found<T: Entity>(id: &str) -> StoreError {
    StoreError::NotFound {
        kind: T::KIND,
        id: id.to_string(),
    }
}
