//! [`Store`]: bootstraps a [`TransactionManager`] and its collaborators from
//! a chosen backend (in-memory or filesystem), and is the entry point for
//! beginning transactions and configuring stores (spec §1, §4.10).

use sop_concurrency::{DefaultStoreRepository, RecoveryServicer, Transaction, TransactionManager};
use sop_core::config::GlobalConfig;
use sop_core::error::Result;
use sop_core::traits::{BlobStore, Cache, Registry, StoreRepository};
use sop_durability::{PriorityLog, TransactionLog};
use sop_engine::InMemoryRegistry;
use sop_storage::{FilesystemBlobStore, InMemoryL2Cache, L1NodeCache, MemoryBlobStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::options::StoreOptions;

/// An open backend: the shared registry, blob store, caches, and logs one
/// process uses for every store and transaction.
pub struct Store {
    manager: Arc<TransactionManager>,
    recovery: RecoveryServicer,
}

impl Store {
    /// Open an in-memory backend — nothing survives the process, useful for
    /// tests and ephemeral workloads.
    pub fn open_in_memory() -> Self {
        Self::open_in_memory_with_config(GlobalConfig::default())
    }

    /// Like [`Store::open_in_memory`], with an explicit [`GlobalConfig`].
    pub fn open_in_memory_with_config(config: GlobalConfig) -> Self {
        let cache: Arc<dyn Cache> = Arc::new(InMemoryL2Cache::new());
        let blobs: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        Self::assemble(cache, blobs, config)
    }

    /// Open a filesystem-backed store rooted at `base_path`, creating it if
    /// necessary. The L2 cache is still the in-memory fallback — a
    /// deployment wanting a real distributed cache swaps that seam, not
    /// this constructor.
    pub fn open_on_filesystem(base_path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_on_filesystem_with_config(base_path, GlobalConfig::default())
    }

    /// Like [`Store::open_on_filesystem`], with an explicit [`GlobalConfig`].
    pub fn open_on_filesystem_with_config(base_path: impl Into<PathBuf>, config: GlobalConfig) -> Result<Self> {
        let cache: Arc<dyn Cache> = Arc::new(InMemoryL2Cache::new());
        let blobs: Arc<dyn BlobStore> = Arc::new(FilesystemBlobStore::new(base_path)?);
        Ok(Self::assemble(cache, blobs, config))
    }

    fn assemble(cache: Arc<dyn Cache>, blobs: Arc<dyn BlobStore>, config: GlobalConfig) -> Self {
        let registry_ttl = Duration::from_secs(config.default_cache_config.registry_duration_secs);
        let registry: Arc<dyn Registry> = Arc::new(InMemoryRegistry::new(cache.clone(), registry_ttl));
        let store_repo: Arc<dyn StoreRepository> = Arc::new(DefaultStoreRepository::new(cache.clone(), blobs.clone()));
        let tx_log = Arc::new(TransactionLog::new(true));
        let priority_log = Arc::new(PriorityLog::new(true));
        let l1 = Arc::new(L1NodeCache::new(config.l1_capacity));

        let recovery = RecoveryServicer::new(
            registry.clone(),
            blobs.clone(),
            cache.clone(),
            tx_log.clone(),
            priority_log.clone(),
        );
        let manager = TransactionManager::new(registry, blobs, l1, cache, store_repo, tx_log, priority_log, config);
        Self { manager, recovery }
    }

    /// Create a new store with the given options. Fails with
    /// [`sop_core::error::Error::Conflict`] if a store with this name
    /// already exists.
    pub fn configure_store(&self, options: StoreOptions) -> Result<()> {
        self.manager.store_repo().create_store(options.into_store_info())
    }

    /// Begin a read-write transaction.
    pub fn begin(&self) -> Transaction {
        self.manager.begin()
    }

    /// Begin a read-only transaction.
    pub fn begin_read_only(&self) -> Transaction {
        self.manager.begin_read_only()
    }

    /// Run one crash-recovery sweep, resolving up to `limit` transactions
    /// left undetermined by a prior crash. A standalone deployment calls
    /// this once at startup; a server deployment runs it periodically.
    pub fn run_recovery_sweep(&self, limit: usize) -> Result<usize> {
        self.recovery.sweep(limit)
    }

    /// The underlying transaction manager, for callers that need direct
    /// access to its collaborators.
    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::StoreSize;

    #[test]
    fn configure_store_then_begin_round_trips_a_write() {
        let store = Store::open_in_memory();
        store
            .configure_store(StoreOptions::new("orders", 8, true, StoreSize::Small))
            .unwrap();

        let mut tx = store.begin();
        tx.add("orders", b"a".to_vec(), b"1".to_vec()).unwrap();
        tx.commit().unwrap();

        let mut check = store.begin_read_only();
        assert!(check.find("orders", b"a").unwrap());
        assert_eq!(check.get_current_value("orders").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn recovery_sweep_runs_cleanly_with_nothing_pending() {
        let store = Store::open_in_memory();
        assert_eq!(store.run_recovery_sweep(10).unwrap(), 0);
    }

    #[test]
    fn filesystem_backend_persists_a_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_on_filesystem(dir.path()).unwrap();
        store
            .configure_store(StoreOptions::new("orders", 8, true, StoreSize::Small))
            .unwrap();

        let mut tx = store.begin();
        tx.add("orders", b"a".to_vec(), b"1".to_vec()).unwrap();
        tx.commit().unwrap();

        assert!(dir.path().join("orders_blobs").exists());
    }
}
