//! Default [`StoreRepository`]: the deadlock-free multi-store update
//! protocol described in spec §4.4, fronted by the same L2 [`Cache`] pattern
//! as [`sop_engine::InMemoryRegistry`].

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sop_core::error::{Error, Result};
use sop_core::store::StoreInfo;
use sop_core::traits::{BlobStore, Cache, LockKey, StoreRepository};
use std::sync::Arc;
use std::time::Duration;

fn cache_key(name: &str) -> String {
    format!("storeinfo:{name}")
}

/// In-process `StoreRepository`. As with [`sop_engine::InMemoryRegistry`],
/// the `DashMap` backend stands in for whatever durable catalog a deployment
/// configures; the locking and cache-coherence protocol above it is
/// backend-independent.
pub struct DefaultStoreRepository {
    backend: DashMap<String, StoreInfo>,
    cache: Arc<dyn Cache>,
    blobs: Arc<dyn BlobStore>,
}

impl DefaultStoreRepository {
    /// Build a store repository fronted by `cache`, using `blobs` to
    /// create/remove each store's blob-table namespace.
    pub fn new(cache: Arc<dyn Cache>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            backend: DashMap::new(),
            cache,
            blobs,
        }
    }

    fn encode(info: &StoreInfo) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(info)?)
    }

    fn decode(bytes: &[u8]) -> Result<StoreInfo> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn cache_put(&self, info: &StoreInfo) -> Result<()> {
        let ttl = Duration::from_secs(info.cache_config.store_info_duration_secs.max(0) as u64);
        self.cache.set(&cache_key(&info.name), &Self::encode(info)?, ttl)
    }

    fn cache_invalidate(&self, name: &str) -> Result<()> {
        self.cache.delete(&cache_key(name))
    }

    fn undo(&self, applied: &[(String, StoreInfo)]) -> Result<()> {
        for (name, old) in applied.iter().rev() {
            self.backend.insert(name.clone(), old.clone());
            self.cache_put(old)?;
        }
        Ok(())
    }
}

impl StoreRepository for DefaultStoreRepository {
    fn create_store(&self, info: StoreInfo) -> Result<()> {
        match self.backend.entry(info.name.clone()) {
            Entry::Occupied(_) => Err(Error::Conflict(format!("store {} already exists", info.name))),
            Entry::Vacant(slot) => {
                self.blobs.create_table(&info.blob_table)?;
                self.cache_put(&info)?;
                slot.insert(info);
                Ok(())
            }
        }
    }

    fn remove_store(&self, name: &str) -> Result<()> {
        if let Some((_, info)) = self.backend.remove(name) {
            self.blobs.remove_table(&info.blob_table)?;
        }
        self.cache_invalidate(name)
    }

    fn get(&self, name: &str) -> Result<Option<StoreInfo>> {
        self.get_with_ttl(name, Duration::from_secs(600))
    }

    fn get_with_ttl(&self, name: &str, ttl: Duration) -> Result<Option<StoreInfo>> {
        if let Some(bytes) = self.cache.get_struct(&cache_key(name), Some(ttl))? {
            return Ok(Some(Self::decode(&bytes)?));
        }
        match self.backend.get(name) {
            Some(info) => {
                let info = info.clone();
                self.cache_put(&info)?;
                Ok(Some(info))
            }
            None => Ok(None),
        }
    }

    fn get_all(&self) -> Result<Vec<StoreInfo>> {
        Ok(self.backend.iter().map(|e| e.value().clone()).collect())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.backend.remove(name);
        self.cache_invalidate(name)
    }

    fn update(&self, updates: Vec<StoreInfo>, lock_ttl: Duration) -> Result<Vec<StoreInfo>> {
        let mut sorted = updates;
        sorted.sort_by(|a, b| a.name.cmp(&b.name));

        let mut applied: Vec<(String, StoreInfo)> = Vec::new();
        let mut results = Vec::new();

        for update in sorted {
            let name = update.name.clone();
            let lock_key = LockKey::for_resource(&cache_key(&name));
            let (locked, _) = self.cache.dual_lock(lock_ttl, std::slice::from_ref(&lock_key))?;
            if !locked {
                self.undo(&applied)?;
                return Err(Error::LockContention(name));
            }

            let outcome = (|| -> Result<StoreInfo> {
                let mut entry = self.backend.get_mut(&name).ok_or(Error::NotFound)?;
                let old = entry.clone();
                let mut new = update.clone();
                new.count = old.count + update.count_delta;
                new.count_delta = 0;
                *entry = new;
                Ok(old)
            })();

            self.cache.unlock(std::slice::from_ref(&lock_key))?;

            match outcome {
                Ok(old) => {
                    let new_info = self.backend.get(&name).expect("just written").clone();
                    self.cache_put(&new_info)?;
                    applied.push((name, old));
                    results.push(new_info);
                }
                Err(e) => {
                    self.undo(&applied)?;
                    return Err(e);
                }
            }
        }

        Ok(results)
    }
}
