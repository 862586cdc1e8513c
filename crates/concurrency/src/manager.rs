//! [`TransactionManager`]: the shared collaborators every [`Transaction`]
//! borrows from, and the entry point for beginning one (spec §4.7).

use crate::clock::now_ms;
use crate::transaction::Transaction;
use sop_core::compare::{ByteOrderComparer, Comparer, ProxyComparer};
use sop_core::config::GlobalConfig;
use sop_core::store::StoreInfo;
use sop_core::traits::{BlobStore, Cache, Registry, StoreRepository};
use sop_durability::{PriorityLog, TransactionLog};
use sop_storage::L1NodeCache;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// A registered key-ordering function, looked up by the
/// `map_key_index_specification` a store was configured with.
type OrderFn = Arc<dyn Fn(&[u8], &[u8]) -> Ordering + Send + Sync>;

/// Owns every collaborator a [`Transaction`] needs and hands out fresh
/// transactions. One instance per open store backend; cheap to clone (it's
/// an `Arc` internally wherever state is shared) and meant to be kept alive
/// for the process's lifetime.
pub struct TransactionManager {
    pub(crate) registry: Arc<dyn Registry>,
    pub(crate) blobs: Arc<dyn BlobStore>,
    pub(crate) l1: Arc<L1NodeCache>,
    pub(crate) cache: Arc<dyn Cache>,
    pub(crate) store_repo: Arc<dyn StoreRepository>,
    pub(crate) tx_log: Arc<TransactionLog>,
    pub(crate) priority_log: Arc<PriorityLog>,
    pub(crate) config: GlobalConfig,
    comparers: RwLock<HashMap<String, OrderFn>>,
}

impl TransactionManager {
    /// Assemble a transaction manager from its collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<dyn Registry>,
        blobs: Arc<dyn BlobStore>,
        l1: Arc<L1NodeCache>,
        cache: Arc<dyn Cache>,
        store_repo: Arc<dyn StoreRepository>,
        tx_log: Arc<TransactionLog>,
        priority_log: Arc<PriorityLog>,
        config: GlobalConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            blobs,
            l1,
            cache,
            store_repo,
            tx_log,
            priority_log,
            config,
            comparers: RwLock::new(HashMap::new()),
        })
    }

    /// The configuration this manager was built with.
    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    /// Register the ordering function a `map_key_index_specification`
    /// string denotes, so stores configured with that spec get a
    /// [`ProxyComparer`] instead of byte order. Re-registering the same
    /// spec replaces the previous function.
    pub fn register_comparer(&self, spec: impl Into<String>, order_fn: impl Fn(&[u8], &[u8]) -> Ordering + Send + Sync + 'static) {
        self.comparers.write().expect("comparer registry lock poisoned").insert(spec.into(), Arc::new(order_fn));
    }

    /// The comparer a store's `StoreInfo` resolves to: a [`ProxyComparer`]
    /// built from its registered ordering function if it has a
    /// `map_key_index_specification` and one was registered for it, or
    /// plain [`ByteOrderComparer`] otherwise.
    pub(crate) fn comparer_for(&self, info: &StoreInfo) -> Arc<dyn Comparer> {
        if let Some(spec) = &info.map_key_index_specification {
            if let Some(order_fn) = self.comparers.read().expect("comparer registry lock poisoned").get(spec).cloned() {
                return Arc::new(ProxyComparer::new(spec.clone(), move |a: &[u8], b: &[u8]| order_fn(a, b)));
            }
        }
        Arc::new(ByteOrderComparer)
    }

    /// The backing store catalog, for callers that need to create or
    /// inspect stores directly (e.g. `sop-api`'s `configure_store`).
    pub fn store_repo(&self) -> &Arc<dyn StoreRepository> {
        &self.store_repo
    }

    /// Begin a read-write transaction.
    pub fn begin(self: &Arc<Self>) -> Transaction {
        Transaction::new(self.clone(), Uuid::new_v4(), now_ms(), false)
    }

    /// Begin a read-only transaction. Any write attempted against it fails
    /// with [`sop_core::error::Error::ReadOnly`]; `commit` is a no-op and
    /// `rollback` is always safe.
    pub fn begin_read_only(self: &Arc<Self>) -> Transaction {
        Transaction::new(self.clone(), Uuid::new_v4(), now_ms(), true)
    }
}
