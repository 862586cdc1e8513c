//! L2: the in-memory stand-in for a distributed cache coordinator (spec's
//! "in-memory fallback"), implementing the Optimistic Orchestration
//! Algorithm's fetch/set/fetch lock protocol (spec §4.6) on top of plain
//! get/set/delete — no native compare-and-swap or lock primitive is
//! assumed of the backend.

use dashmap::DashMap;
use sop_core::error::Result;
use sop_core::traits::{Cache, LockKey};
use std::time::{Duration, Instant};
use uuid::Uuid;

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory L2 cache coordinator.
#[derive(Default)]
pub struct InMemoryL2Cache {
    entries: DashMap<String, Entry>,
}

impl InMemoryL2Cache {
    /// A fresh, empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self, key: &str) -> Option<Vec<u8>> {
        match self.entries.get(key) {
            Some(e) if !e.is_expired() => Some(e.value.clone()),
            _ => None,
        }
    }
}

impl Cache for InMemoryL2Cache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.read(key))
    }

    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn dual_lock(&self, duration: Duration, keys: &[LockKey]) -> Result<(bool, Option<LockKey>)> {
        let owner = Uuid::new_v4();
        let mut acquired: Vec<LockKey> = Vec::with_capacity(keys.len());

        // Fetch + set: refuse to overwrite a lock someone else already holds.
        for key in keys {
            if self.read(&key.0).is_some() {
                self.unlock(&acquired)?;
                return Ok((false, Some(key.clone())));
            }
            self.set(&key.0, owner.as_bytes(), duration)?;
            acquired.push(key.clone());
        }

        // Fetch again: confirm we still own every key (a racing dual_lock
        // could have written over ours between our set and now).
        for key in keys {
            if self.read(&key.0).as_deref() != Some(owner.as_bytes()) {
                self.unlock(&acquired)?;
                return Ok((false, Some(key.clone())));
            }
        }

        Ok((true, None))
    }

    fn unlock(&self, keys: &[LockKey]) -> Result<()> {
        for key in keys {
            self.entries.remove(&key.0);
        }
        Ok(())
    }

    fn is_locked(&self, keys: &[LockKey]) -> Result<bool> {
        Ok(keys.iter().any(|k| self.read(&k.0).is_some()))
    }
}
