//! Reference cache: full-replace snapshots of reference data.

use crate::codec::{from_cbor, to_cbor};
use crate::error::{StoreError, StoreResult};
use crate::reference::{Reference, ReferenceKind};
use crate::store::LocalStore;
use crate::types::{now_millis, EpochMillis, RecordKey};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

#[derive(Serialize, Deserialize)]
struct Stored<R> {
    snapshot: R,
    timestamp: EpochMillis,
}

/// One cached snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<R> {
    /// Domain key, or the singleton sentinel.
    pub key: String,
    /// Copy of the remote record at fetch time.
    pub snapshot: R,
    /// Time of the refresh that wrote it.
    pub timestamp: EpochMillis,
}

/// Local side of the reference cache.
///
/// Writes always replace a kind wholesale in one store entry; there are no
/// partial updates or individual deletes. Reads never touch the network.
#[derive(Debug, Clone)]
pub struct ReferenceCache {
    store: Arc<LocalStore>,
}

impl ReferenceCache {
    /// Creates a cache over `store`.
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    /// Replaces everything cached for `R::KIND` with `snapshots`.
    ///
    /// Returns the timestamp stamped on the new entries.
    ///
    /// # Errors
    ///
    /// Fails without touching the cache if a single-row kind is given more
    /// than one snapshot, or if the store rejects the write.
    pub fn replace<R: Reference>(&self, snapshots: Vec<R>) -> StoreResult<EpochMillis> {
        if R::KIND.is_single_row() && snapshots.len() > 1 {
            return Err(StoreError::invalid_operation(format!(
                "{} holds a single entry, got {}",
                R::KIND,
                snapshots.len()
            )));
        }

        let timestamp = now_millis();
        let count = snapshots.len();
        let entries = snapshots
            .into_iter()
            .map(|snapshot| {
                let key = RecordKey::Named(snapshot.cache_key());
                let bytes = to_cbor(&Stored {
                    snapshot,
                    timestamp,
                })?;
                Ok((key, bytes))
            })
            .collect::<StoreResult<Vec<_>>>()?;

        self.store.replace_all(R::KIND.collection(), entries)?;
        debug!(kind = %R::KIND, entries = count, "reference cache replaced");
        Ok(timestamp)
    }

    /// Returns every cached entry of `R::KIND`, in key order.
    pub fn read<R: Reference>(&self) -> StoreResult<Vec<CacheEntry<R>>> {
        self.store
            .get_all(R::KIND.collection())?
            .into_iter()
            .map(|(key, bytes)| {
                let stored: Stored<R> = from_cbor(&bytes)?;
                Ok(CacheEntry {
                    key: key.to_string(),
                    snapshot: stored.snapshot,
                    timestamp: stored.timestamp,
                })
            })
            .collect()
    }

    /// Returns the entry of a single-row kind, if cached.
    pub fn read_single<R: Reference>(&self) -> StoreResult<Option<CacheEntry<R>>> {
        Ok(self.read::<R>()?.into_iter().next())
    }

    /// Returns true if at least one entry of `kind` is cached.
    pub fn is_populated(&self, kind: ReferenceKind) -> StoreResult<bool> {
        Ok(self.count(kind)? > 0)
    }

    /// Number of cached entries of `kind`.
    pub fn count(&self, kind: ReferenceKind) -> StoreResult<usize> {
        self.store.count(kind.collection())
    }

    /// Drops everything cached for `kind`.
    pub fn clear(&self, kind: ReferenceKind) -> StoreResult<()> {
        self.store.clear(kind.collection())?;
        debug!(%kind, "reference cache cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{BusinessProfile, Product, ShiftState, SINGLETON_KEY};
    use crate::schema::Schema;

    fn cache() -> ReferenceCache {
        let store = Arc::new(LocalStore::open_in_memory(&Schema::point_of_sale()).unwrap());
        ReferenceCache::new(store)
    }

    fn product(id: &str) -> Product {
        Product {
            id: id.into(),
            name: format!("product {id}"),
            ..Product::default()
        }
    }

    #[test]
    fn empty_cache_is_not_populated() {
        let cache = cache();
        assert!(!cache.is_populated(ReferenceKind::ProductCatalog).unwrap());
        assert!(cache.read::<Product>().unwrap().is_empty());
        assert!(cache.read_single::<BusinessProfile>().unwrap().is_none());
    }

    #[test]
    fn replace_is_full_replace() {
        let cache = cache();
        cache.replace(vec![product("1"), product("2")]).unwrap();
        cache.replace(vec![product("3")]).unwrap();

        let entries = cache.read::<Product>().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "3");
        assert_eq!(entries[0].snapshot, product("3"));
    }

    #[test]
    fn single_row_kind_rejects_two_snapshots() {
        let cache = cache();
        cache.replace(vec![BusinessProfile::default()]).unwrap();

        let err = cache
            .replace(vec![BusinessProfile::default(), BusinessProfile::default()])
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidOperation { .. }));
        assert_eq!(cache.count(ReferenceKind::BusinessProfile).unwrap(), 1);
    }

    #[test]
    fn single_row_uses_sentinel_key() {
        let cache = cache();
        let state = ShiftState {
            open: true,
            cashier: "ana".into(),
            ..ShiftState::default()
        };
        let stamped = cache.replace(vec![state.clone()]).unwrap();

        let entry = cache.read_single::<ShiftState>().unwrap().unwrap();
        assert_eq!(entry.key, SINGLETON_KEY);
        assert_eq!(entry.snapshot, state);
        assert_eq!(entry.timestamp, stamped);
    }

    #[test]
    fn clear_empties_one_kind_only() {
        let cache = cache();
        cache.replace(vec![product("1")]).unwrap();
        cache.replace(vec![BusinessProfile::default()]).unwrap();

        cache.clear(ReferenceKind::ProductCatalog).unwrap();
        assert!(!cache.is_populated(ReferenceKind::ProductCatalog).unwrap());
        assert!(cache.is_populated(ReferenceKind::BusinessProfile).unwrap());
    }
}
