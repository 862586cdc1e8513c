//! Default [`sop_core::traits::Registry`]: the authoritative logical-id →
//! [`Handle`] map, backed by a durable map and fronted by an L2 [`Cache`]
//! for fast, coordinated reads (spec §4.5).

use dashmap::DashMap;
use sop_core::error::{Error, Result};
use sop_core::handle::Handle;
use sop_core::traits::{Cache, LockKey, Registry};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn cache_key(logical_id: Uuid) -> String {
    logical_id.to_string()
}

/// In-process `Registry`. The "backend" here is an in-memory map standing
/// in for whatever durable store (filesystem, Cassandra) a deployment
/// configures — the map itself is the seam an out-of-process backend would
/// replace; everything above it (L2-first reads, OOA locking on update) is
/// backend-independent and lives here.
pub struct InMemoryRegistry {
    backend: DashMap<Uuid, Handle>,
    cache: Arc<dyn Cache>,
    cache_ttl: Duration,
}

impl InMemoryRegistry {
    /// Build a registry fronted by `cache`, caching entries for `cache_ttl`
    /// (the store's configured registry cache duration — spec default 10
    /// minutes).
    pub fn new(cache: Arc<dyn Cache>, cache_ttl: Duration) -> Self {
        Self {
            backend: DashMap::new(),
            cache,
            cache_ttl,
        }
    }

    fn encode(handle: &Handle) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(handle)?)
    }

    fn decode(bytes: &[u8]) -> Result<Handle> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn cache_put(&self, handle: &Handle) -> Result<()> {
        let bytes = Self::encode(handle)?;
        self.cache.set(&cache_key(handle.logical_id), &bytes, self.cache_ttl)
    }

    fn cache_invalidate(&self, logical_id: Uuid) -> Result<()> {
        self.cache.delete(&cache_key(logical_id))
    }
}

impl Registry for InMemoryRegistry {
    fn get(&self, logical_id: Uuid, refresh_ttl: Option<Duration>) -> Result<Option<Handle>> {
        if let Some(bytes) = self.cache.get_struct(&cache_key(logical_id), refresh_ttl.or(Some(self.cache_ttl)))? {
            return Ok(Some(Self::decode(&bytes)?));
        }
        match self.backend.get(&logical_id) {
            Some(h) => {
                let h = *h;
                self.cache_put(&h)?;
                Ok(Some(h))
            }
            None => Ok(None),
        }
    }

    fn add(&self, handle: Handle) -> Result<()> {
        match self.backend.entry(handle.logical_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(Error::Conflict(format!(
                    "handle already registered for logical id {}",
                    handle.logical_id
                )))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(handle);
                self.cache_put(&handle)?;
                Ok(())
            }
        }
    }

    fn update(&self, expected: Handle, new: Handle, lock_ttl: Duration) -> Result<()> {
        let lock_key = LockKey::for_resource(&new.logical_id.to_string());
        let (locked, _) = self.cache.dual_lock(lock_ttl, std::slice::from_ref(&lock_key))?;
        if !locked {
            return Err(Error::LockContention(new.logical_id.to_string()));
        }

        let result = (|| {
            let mut entry = self
                .backend
                .get_mut(&expected.logical_id)
                .ok_or(Error::NotFound)?;
            if !entry.is_equal(&expected) {
                return Err(Error::Conflict(format!(
                    "handle {} moved since it was read",
                    expected.logical_id
                )));
            }
            *entry = new;
            Ok(())
        })();

        if result.is_ok() {
            self.cache_put(&new)?;
        } else {
            self.cache_invalidate(new.logical_id)?;
        }
        self.cache.unlock(std::slice::from_ref(&lock_key))?;
        result
    }

    fn update_no_locks(&self, pairs: Vec<(Handle, Handle)>, all_or_nothing: bool) -> Result<()> {
        if all_or_nothing {
            for (expected, _) in &pairs {
                match self.backend.get(&expected.logical_id) {
                    Some(current) if current.is_equal(expected) => {}
                    _ => {
                        return Err(Error::Conflict(format!(
                            "handle {} moved since it was read",
                            expected.logical_id
                        )))
                    }
                }
            }
        }

        for (expected, new) in pairs {
            match self.backend.get_mut(&expected.logical_id) {
                Some(mut current) if current.is_equal(&expected) => {
                    *current = new;
                    self.cache_put(&new)?;
                }
                Some(_) => {
                    return Err(Error::Conflict(format!(
                        "handle {} moved since it was read",
                        expected.logical_id
                    )))
                }
                None => return Err(Error::NotFound),
            }
        }
        Ok(())
    }

    fn remove(&self, logical_id: Uuid) -> Result<()> {
        self.backend.remove(&logical_id);
        self.cache_invalidate(logical_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sop_storage::InMemoryL2Cache;

    fn registry() -> InMemoryRegistry {
        InMemoryRegistry::new(Arc::new(InMemoryL2Cache::new()), Duration::from_secs(600))
    }

    #[test]
    fn add_then_get_round_trips() {
        let reg = registry();
        let h = Handle::new(Uuid::new_v4(), Uuid::new_v4());
        reg.add(h).unwrap();
        assert_eq!(reg.get(h.logical_id, None).unwrap(), Some(h));
    }

    #[test]
    fn add_twice_conflicts() {
        let reg = registry();
        let h = Handle::new(Uuid::new_v4(), Uuid::new_v4());
        reg.add(h).unwrap();
        assert!(matches!(reg.add(h), Err(Error::Conflict(_))));
    }

    #[test]
    fn update_succeeds_when_expected_matches_current() {
        let reg = registry();
        let h = Handle::new(Uuid::new_v4(), Uuid::new_v4());
        reg.add(h).unwrap();
        let mut new = h;
        new.stage(Uuid::new_v4(), 1);
        new.commit();
        reg.update(h, new, Duration::from_secs(60)).unwrap();
        assert_eq!(reg.get(h.logical_id, None).unwrap(), Some(new));
    }

    #[test]
    fn update_conflicts_when_expected_is_stale() {
        let reg = registry();
        let h = Handle::new(Uuid::new_v4(), Uuid::new_v4());
        reg.add(h).unwrap();
        let mut winner = h;
        winner.stage(Uuid::new_v4(), 1);
        winner.commit();
        reg.update(h, winner, Duration::from_secs(60)).unwrap();

        let mut loser = h;
        loser.stage(Uuid::new_v4(), 2);
        loser.commit();
        let err = reg.update(h, loser, Duration::from_secs(60)).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn update_no_locks_all_or_nothing_aborts_on_any_mismatch() {
        let reg = registry();
        let h1 = Handle::new(Uuid::new_v4(), Uuid::new_v4());
        let h2 = Handle::new(Uuid::new_v4(), Uuid::new_v4());
        reg.add(h1).unwrap();
        reg.add(h2).unwrap();

        let mut new1 = h1;
        new1.stage(Uuid::new_v4(), 1);
        new1.commit();
        let mut stale_expected_h2 = h2;
        stale_expected_h2.version = 99; // force mismatch

        let mut new2 = h2;
        new2.stage(Uuid::new_v4(), 1);
        new2.commit();

        let err = reg
            .update_no_locks(vec![(h1, new1), (stale_expected_h2, new2)], true)
            .unwrap_err();
        assert!(err.is_conflict());
        // all-or-nothing: h1 must be untouched since the batch as a whole failed
        assert_eq!(reg.get(h1.logical_id, None).unwrap(), Some(h1));
    }

    #[test]
    fn remove_clears_handle() {
        let reg = registry();
        let h = Handle::new(Uuid::new_v4(), Uuid::new_v4());
        reg.add(h).unwrap();
        reg.remove(h.logical_id).unwrap();
        assert_eq!(reg.get(h.logical_id, None).unwrap(), None);
    }
}
