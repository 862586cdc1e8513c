//! The [`Transaction`] facade: one B-Tree session per store, and the
//! two-phase commit protocol that makes its writes visible atomically
//! (spec §4.7).

use crate::clock::now_ms;
use crate::manager::TransactionManager;
use sop_core::error::{Error, Result};
use sop_core::handle::Handle;
use sop_core::item::ItemValue;
use sop_core::store::StoreInfo;
use sop_core::traits::{BlobStore, Cache, LockKey, NodeRepository, Registry};
use sop_durability::priority_log::PendingSwap;
use sop_durability::transaction_log::TxStep;
use sop_engine::{BTreeEngine, Cursor, DefaultItemActionTracker, TxNodeRepository};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn value_cache_key(item_id: Uuid) -> String {
    format!("value:{item_id}")
}

/// One logical id's Phase 1 outcome: the blob (if any) staged for it, and
/// the fully finalized handle Phase 2 will try to write — computed ahead of
/// time so the same value can be logged to the priority log, used for the
/// registry swap, and used to find the superseded blob after a successful
/// commit, without re-deriving it three different ways.
struct Swap {
    store: String,
    logical_id: Uuid,
    expected: Option<Handle>,
    staged: Handle,
    /// `None` for a brand-new node (nothing to recheck/roll back to).
    finalized: Option<Handle>,
    physical_id: Uuid,
    bytes: Vec<u8>,
}

struct StoreState {
    /// The working `StoreInfo` this transaction is mutating (`count_delta`
    /// accumulates here; `root_node_id` tracks splits/merges of the root).
    info: StoreInfo,
    /// The snapshot read when this store was first touched, used to build
    /// the phase-2 `StoreRepository::update` batch.
    baseline: StoreInfo,
    repo: TxNodeRepository,
    tracker: DefaultItemActionTracker,
    cursor: Cursor,
}

/// A unit of work against one or more stores.
///
/// Reads and writes run against an in-memory working set only —
/// [`TxNodeRepository`] never touches the [`sop_core::traits::Registry`] or
/// [`BlobStore`] for anything it creates or modifies until
/// [`Transaction::commit`] runs. That makes an unfinished or abandoned
/// transaction free to discard: there is nothing durable to clean up.
pub struct Transaction {
    manager: Arc<TransactionManager>,
    tid: Uuid,
    started_at_ms: i64,
    read_only: bool,
    stores: HashMap<String, StoreState>,
}

impl Transaction {
    pub(crate) fn new(manager: Arc<TransactionManager>, tid: Uuid, started_at_ms: i64, read_only: bool) -> Self {
        Self {
            manager,
            tid,
            started_at_ms,
            read_only,
            stores: HashMap::new(),
        }
    }

    /// This transaction's id, as logged in the transaction and priority
    /// logs.
    pub fn id(&self) -> Uuid {
        self.tid
    }

    fn guard_writable(&self) -> Result<()> {
        if self.read_only {
            Err(Error::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn ensure_store(&mut self, store: &str) -> Result<()> {
        if self.stores.contains_key(store) {
            return Ok(());
        }
        let info = self.manager.store_repo.get(store)?.ok_or(Error::NotFound)?;
        let repo = TxNodeRepository::new(
            self.manager.registry.clone(),
            self.manager.l1.clone(),
            self.manager.blobs.clone(),
            info.blob_table.clone(),
        );
        self.stores.insert(
            store.to_string(),
            StoreState {
                baseline: info.clone(),
                info,
                repo,
                tracker: DefaultItemActionTracker::new(),
                cursor: Cursor::default(),
            },
        );
        Ok(())
    }

    fn with_engine<R>(&mut self, store: &str, f: impl FnOnce(&mut BTreeEngine<'_>) -> Result<R>) -> Result<R> {
        self.ensure_store(store)?;
        let comparer = self.manager.comparer_for(&self.stores[store].info);
        let state = self.stores.get_mut(store).expect("just ensured");
        let mut engine = BTreeEngine::new(&mut state.repo, &*comparer, &mut state.info, &mut state.tracker);
        engine.set_cursor(state.cursor);
        let result = f(&mut engine);
        state.cursor = engine.cursor();
        result
    }

    // ---- reads --------------------------------------------------------

    /// Position the cursor on the first item equal to `key`.
    pub fn find(&mut self, store: &str, key: &[u8]) -> Result<bool> {
        self.with_engine(store, |e| e.find(key, true))
    }

    /// Position the cursor on the item with both `key` and `item_id`.
    pub fn find_with_id(&mut self, store: &str, key: &[u8], item_id: Uuid) -> Result<bool> {
        self.with_engine(store, |e| e.find_with_id(key, item_id))
    }

    /// Position the cursor on the first item in key order.
    pub fn first(&mut self, store: &str) -> Result<bool> {
        self.with_engine(store, |e| e.first())
    }

    /// Position the cursor on the last item in key order.
    pub fn last(&mut self, store: &str) -> Result<bool> {
        self.with_engine(store, |e| e.last())
    }

    /// Advance the cursor to the next item in key order.
    pub fn next(&mut self, store: &str) -> Result<bool> {
        self.with_engine(store, |e| e.next())
    }

    /// Move the cursor to the previous item in key order.
    pub fn previous(&mut self, store: &str) -> Result<bool> {
        self.with_engine(store, |e| e.previous())
    }

    /// The key the cursor currently sits on, if any.
    pub fn get_current_key(&mut self, store: &str) -> Result<Option<Vec<u8>>> {
        self.with_engine(store, |e| e.get_current_key())
    }

    /// The fully-resolved value bytes the cursor currently sits on —
    /// fetched from the `BlobStore` (or the global value cache) when the
    /// item is stored out-of-line.
    pub fn get_current_value(&mut self, store: &str) -> Result<Option<Vec<u8>>> {
        let item = self.with_engine(store, |e| e.get_current_item())?;
        let item = match item {
            Some(item) => item,
            None => return Ok(None),
        };
        match item.value {
            ItemValue::Inline(bytes) => Ok(Some(bytes)),
            ItemValue::OutOfLine => {
                if let Some(cached) = self.manager.cache.get(&value_cache_key(item.id))? {
                    return Ok(Some(cached));
                }
                let table = self.stores.get(store).expect("ensured by with_engine").info.blob_table.clone();
                self.manager.blobs.get(&table, item.id)
            }
        }
    }

    /// Number of items currently in `store` (baseline count plus this
    /// transaction's own uncommitted deltas).
    pub fn count(&mut self, store: &str) -> Result<i64> {
        self.ensure_store(store)?;
        Ok(self.stores.get(store).expect("just ensured").info.effective_count())
    }

    /// Whether `store` enforces unique keys.
    pub fn is_unique(&mut self, store: &str) -> Result<bool> {
        self.ensure_store(store)?;
        Ok(self.stores.get(store).expect("just ensured").info.is_unique)
    }

    // ---- writes ---------------------------------------------------------

    fn value_for_write(&self, store: &str, bytes: Vec<u8>) -> ItemValue {
        if self.stores[store].info.is_value_data_in_node_segment {
            ItemValue::Inline(bytes)
        } else {
            ItemValue::OutOfLine
        }
    }

    fn persist_out_of_line(&self, store: &str, item_id: Uuid, value: &[u8]) -> Result<()> {
        let info = &self.stores[store].info;
        if info.is_value_data_actively_persisted {
            self.manager.blobs.put(&info.blob_table, item_id, value)?;
        }
        if info.is_value_data_globally_cached && !info.cache_config.value_caching_disabled() {
            let ttl = Duration::from_secs(info.cache_config.value_duration_secs.max(0) as u64);
            self.manager.cache.set(&value_cache_key(item_id), value, ttl)?;
        }
        Ok(())
    }

    fn forget_out_of_line(&self, store: &str, item_id: Uuid) -> Result<()> {
        let info = &self.stores[store].info;
        self.manager.blobs.remove(&info.blob_table, item_id)?;
        self.manager.cache.delete(&value_cache_key(item_id))
    }

    /// Insert `(key, value)`. Fails with [`Error::DuplicateKey`] if `store`
    /// is unique and `key` already exists.
    pub fn add(&mut self, store: &str, key: Vec<u8>, value: Vec<u8>) -> Result<Uuid> {
        self.guard_writable()?;
        self.ensure_store(store)?;
        let item_value = self.value_for_write(store, value.clone());
        let inline = matches!(item_value, ItemValue::Inline(_));
        let id = self.with_engine(store, |e| e.add(key, item_value))?;
        if !inline {
            self.persist_out_of_line(store, id, &value)?;
        }
        Ok(id)
    }

    /// Insert `(key, value)` only if `key` is absent; returns whether it was
    /// inserted.
    pub fn add_if_not_exist(&mut self, store: &str, key: Vec<u8>, value: Vec<u8>) -> Result<bool> {
        self.guard_writable()?;
        self.ensure_store(store)?;
        let item_value = self.value_for_write(store, value.clone());
        let inline = matches!(item_value, ItemValue::Inline(_));
        let current_key = key.clone();
        let added = self.with_engine(store, |e| e.add_if_not_exist(key, item_value))?;
        if added && !inline {
            self.find(store, &current_key)?;
            let id = self.with_engine(store, |e| e.get_current_item())?.ok_or(Error::NotFound)?.id;
            self.persist_out_of_line(store, id, &value)?;
        }
        Ok(added)
    }

    /// Replace the value stored under the first item equal to `key`.
    pub fn update(&mut self, store: &str, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.guard_writable()?;
        self.ensure_store(store)?;
        let item_value = self.value_for_write(store, value.clone());
        let inline = matches!(item_value, ItemValue::Inline(_));
        self.with_engine(store, |e| e.update(key, item_value))?;
        if !inline {
            // `update` leaves the cursor on the item it just touched.
            let id = self.with_engine(store, |e| e.get_current_item())?.ok_or(Error::NotFound)?.id;
            self.persist_out_of_line(store, id, &value)?;
        }
        Ok(())
    }

    /// Insert `(key, value)` if absent, otherwise replace the existing
    /// value.
    pub fn upsert(&mut self, store: &str, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.guard_writable()?;
        self.ensure_store(store)?;
        let item_value = self.value_for_write(store, value.clone());
        let inline = matches!(item_value, ItemValue::Inline(_));
        let current_key = key.clone();
        self.with_engine(store, |e| e.upsert(key, item_value))?;
        if !inline {
            self.find(store, &current_key)?;
            let id = self.with_engine(store, |e| e.get_current_item())?.ok_or(Error::NotFound)?.id;
            self.persist_out_of_line(store, id, &value)?;
        }
        Ok(())
    }

    /// Replace the value of whatever item the cursor currently sits on.
    pub fn update_current(&mut self, store: &str, value: Vec<u8>) -> Result<()> {
        self.guard_writable()?;
        self.ensure_store(store)?;
        let item_value = self.value_for_write(store, value.clone());
        let inline = matches!(item_value, ItemValue::Inline(_));
        let id = self.with_engine(store, |e| e.get_current_item())?.ok_or(Error::NotFound)?.id;
        self.with_engine(store, |e| e.update_current(item_value))?;
        if !inline {
            self.persist_out_of_line(store, id, &value)?;
        }
        Ok(())
    }

    /// Remove the first item equal to `key`.
    pub fn remove(&mut self, store: &str, key: &[u8]) -> Result<()> {
        self.guard_writable()?;
        if !self.find(store, key)? {
            return Err(Error::NotFound);
        }
        self.remove_current(store)
    }

    /// Remove whatever item the cursor currently sits on.
    pub fn remove_current(&mut self, store: &str) -> Result<()> {
        self.guard_writable()?;
        let item = self.with_engine(store, |e| e.get_current_item())?.ok_or(Error::NotFound)?;
        let inline = self.stores[store].info.is_value_data_in_node_segment;
        self.with_engine(store, |e| e.remove_current())?;
        if !inline {
            self.forget_out_of_line(store, item.id)?;
        }
        Ok(())
    }

    // ---- commit / rollback ----------------------------------------------

    /// Discard every change made by this transaction. Since nothing is
    /// written through to the registry or blob store before `commit`, this
    /// is equivalent to simply dropping the transaction.
    pub fn rollback(self) {}

    /// Run the two-phase commit protocol (spec §4.7): stage blobs and take
    /// OOA locks (phase 1), recheck every touched resource twice, then swap
    /// every [`Handle`] atomically (phase 2, the commit point).
    pub fn commit(mut self) -> Result<()> {
        if self.read_only || self.stores.is_empty() {
            return Ok(());
        }

        let now = now_ms();
        if now - self.started_at_ms > self.manager.config.commit_max_duration.as_millis() as i64 {
            return Err(Error::Timeout(format!(
                "transaction {} exceeded its commit deadline",
                self.tid
            )));
        }

        let touched: Vec<String> = self.stores.keys().cloned().collect();

        // Gather every logical id this transaction needs a recheck/lock for:
        // reads and writes alike, since a concurrently-committed write to a
        // node this transaction only *read* still breaks serializability.
        let mut resources: Vec<(String, Uuid)> = Vec::new();
        for name in &touched {
            let state = &self.stores[name];
            for id in state
                .repo
                .fetched()
                .into_iter()
                .chain(state.repo.updated())
                .chain(state.repo.removed())
                .chain(state.repo.added())
            {
                resources.push((name.clone(), id));
            }
        }
        resources.sort();
        resources.dedup();

        let lock_keys: Vec<LockKey> = resources
            .iter()
            .map(|(store, id)| LockKey::for_resource(&format!("{store}:{id}")))
            .collect();
        let lock_ttl = self.manager.config.commit_max_duration;

        let (locked, conflict) = self.manager.cache.dual_lock(lock_ttl, &lock_keys)?;
        if !locked {
            return Err(Error::LockContention(
                conflict.map(|k| k.0).unwrap_or_else(|| "unknown".into()),
            ));
        }

        let outcome = self.run_commit(now, lock_ttl);

        self.manager.cache.unlock(&lock_keys).ok();
        self.manager.tx_log.remove(self.tid);
        self.manager.priority_log.remove(self.tid);
        outcome
    }

    /// Remove every blob this transaction staged in Phase 1 but never made
    /// active — called on any abort after staging has run. Best effort:
    /// failures are swallowed since the blobs are merely orphaned, not
    /// referenced by anything, and a later sweep can collect them too.
    fn cleanup_staged_blobs(&self, swaps: &[Swap]) {
        for s in swaps {
            if s.bytes.is_empty() {
                continue; // nothing was staged for this swap (e.g. a removal)
            }
            let blob_table = &self.stores[&s.store].info.blob_table;
            self.manager.blobs.remove(blob_table, s.physical_id).ok();
        }
    }

    fn run_commit(&mut self, now: i64, lock_ttl: Duration) -> Result<()> {

        let touched: Vec<String> = self.stores.keys().cloned().collect();

        // ---- Phase 1: recheck A, stage new blobs ----
        let mut swaps = Vec::new();
        for name in &touched {
            let state = self.stores.get(name).expect("touched store exists");
            for id in state
                .repo
                .fetched()
                .into_iter()
                .chain(state.repo.updated())
                .chain(state.repo.removed())
            {
                if let Some(observed) = state.repo.observed_handle(id) {
                    let current = self.manager.registry.get(id, None)?.ok_or(Error::NotFound)?;
                    if !current.is_equal(&observed) {
                        return Err(Error::Conflict(format!("{name}:{id} changed since it was read")));
                    }
                }
            }
        }
        self.manager.tx_log.add(self.tid, 1, &TxStep::RecheckAPassed, now)?;

        for name in &touched {
            let state = self.stores.get(name).expect("touched store exists");
            for id in state.repo.added() {
                let node = state.repo.working_node(id).ok_or(Error::NotFound)?.clone();
                let physical_id = Uuid::new_v4();
                let bytes = serde_json::to_vec(&node)?;
                self.manager.blobs.put(&state.info.blob_table, physical_id, &bytes)?;
                self.manager
                    .tx_log
                    .add(self.tid, 2, &TxStep::BlobStaged { store: name.clone(), logical_id: id, physical_id }, now)?;
                let mut staged = Handle::new(id, physical_id);
                staged.work_in_progress_timestamp = now;
                swaps.push(Swap { store: name.clone(), logical_id: id, expected: None, staged, finalized: None, physical_id, bytes });
            }
            for id in state.repo.updated() {
                let node = state.repo.working_node(id).ok_or(Error::NotFound)?.clone();
                let observed = state.repo.observed_handle(id).ok_or(Error::NotFound)?;
                let physical_id = Uuid::new_v4();
                let bytes = serde_json::to_vec(&node)?;
                self.manager.blobs.put(&state.info.blob_table, physical_id, &bytes)?;
                self.manager
                    .tx_log
                    .add(self.tid, 2, &TxStep::BlobStaged { store: name.clone(), logical_id: id, physical_id }, now)?;
                let mut staged = observed;
                staged.stage(physical_id, now);
                let mut finalized = staged;
                finalized.commit();
                swaps.push(Swap {
                    store: name.clone(),
                    logical_id: id,
                    expected: Some(observed),
                    staged,
                    finalized: Some(finalized),
                    physical_id,
                    bytes,
                });
            }
            for id in state.repo.removed() {
                let observed = state.repo.observed_handle(id).ok_or(Error::NotFound)?;
                let mut staged = observed;
                staged.is_deleted = true;
                staged.work_in_progress_timestamp = now;
                let mut finalized = staged;
                finalized.version = observed.version + 1;
                finalized.clear_work_in_progress();
                swaps.push(Swap {
                    store: name.clone(),
                    logical_id: id,
                    expected: Some(observed),
                    staged,
                    finalized: Some(finalized),
                    physical_id: observed.active_physical_id(),
                    bytes: Vec::new(),
                });
            }
        }

        let pending: Vec<PendingSwap> = swaps
            .iter()
            .filter_map(|s| {
                let expected = s.expected?;
                let new = s.finalized?;
                let blob_table = self.stores[&s.store].info.blob_table.clone();
                Some(PendingSwap { expected, new, blob_table, applied: false })
            })
            .collect();
        self.manager.priority_log.record(self.tid, &pending, now)?;

        // ---- Phase 2: recheck B, commit point ----
        for s in &swaps {
            if let Some(expected) = s.expected {
                let current = self.manager.registry.get(s.logical_id, None)?.ok_or(Error::NotFound)?;
                if !current.is_equal(&expected) {
                    self.cleanup_staged_blobs(&swaps);
                    return Err(Error::Conflict(format!("{}:{} changed before the commit point", s.store, s.logical_id)));
                }
            }
        }
        self.manager.tx_log.add(self.tid, 3, &TxStep::RecheckBPassed, now)?;

        let mut pairs = Vec::new();
        for s in &swaps {
            match s.expected {
                None => {
                    let mut final_handle = s.staged;
                    final_handle.clear_work_in_progress();
                    self.manager.registry.add(final_handle)?;
                }
                Some(expected) => {
                    pairs.push((expected, s.finalized.expect("finalized is set for every update/removal")));
                }
            }
        }
        if !pairs.is_empty() {
            if let Err(e) = self.manager.registry.update_no_locks(pairs, true) {
                self.cleanup_staged_blobs(&swaps);
                return Err(e);
            }
        }
        for s in &swaps {
            self.manager
                .tx_log
                .add(self.tid, 4, &TxStep::RegistrySwapped { logical_id: s.logical_id, new_version: s.staged.version }, now)
                .ok();
            if !s.bytes.is_empty() {
                if let Ok(node) = serde_json::from_slice(&s.bytes) {
                    self.manager.l1.put(s.physical_id, node);
                }
            }
            // The blob this handle pointed at before this commit is now
            // superseded (or, for a tombstoned delete, simply dead) — free
            // it now that the swap is durable.
            if let Some(new) = s.finalized {
                let superseded = if new.is_deleted { new.active_physical_id() } else { new.inactive_physical_id() };
                let blob_table = self.stores[&s.store].info.blob_table.clone();
                self.manager.blobs.remove(&blob_table, superseded)?;
            }
        }

        let mut store_updates = Vec::new();
        for name in &touched {
            let state = &self.stores[name];
            if state.info.count_delta != 0 || state.info.root_node_id != state.baseline.root_node_id {
                let mut update = state.baseline.clone();
                update.count_delta = state.info.count_delta;
                update.root_node_id = state.info.root_node_id;
                store_updates.push(update);
            }
        }
        if !store_updates.is_empty() {
            self.manager.store_repo.update(store_updates, lock_ttl)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::TransactionManager;
    use sop_core::config::GlobalConfig;
    use sop_durability::{PriorityLog, TransactionLog};
    use sop_engine::InMemoryRegistry;
    use sop_storage::{InMemoryL2Cache, L1NodeCache, MemoryBlobStore};

    fn manager() -> Arc<TransactionManager> {
        let cache: Arc<dyn Cache> = Arc::new(InMemoryL2Cache::new());
        let registry: Arc<dyn Registry> = Arc::new(InMemoryRegistry::new(cache.clone(), Duration::from_secs(600)));
        let blobs: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let store_repo = Arc::new(crate::DefaultStoreRepository::new(cache.clone(), blobs.clone()));
        TransactionManager::new(
            registry,
            blobs,
            Arc::new(L1NodeCache::new(1_000)),
            cache,
            store_repo,
            Arc::new(TransactionLog::new(true)),
            Arc::new(PriorityLog::new(true)),
            GlobalConfig::default(),
        )
    }

    fn with_store(mgr: &Arc<TransactionManager>, name: &str, is_unique: bool) {
        let info = StoreInfo::new(name, 8, is_unique);
        mgr.store_repo.create_store(info).unwrap();
    }

    #[test]
    fn add_then_commit_then_find_in_a_new_transaction() {
        let mgr = manager();
        with_store(&mgr, "orders", true);

        let mut tx = mgr.begin();
        tx.add("orders", b"a".to_vec(), b"1".to_vec()).unwrap();
        tx.commit().unwrap();

        let mut tx2 = mgr.begin();
        assert!(tx2.find("orders", b"a").unwrap());
        assert_eq!(tx2.get_current_value("orders").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn uncommitted_writes_are_invisible_to_a_concurrent_transaction() {
        let mgr = manager();
        with_store(&mgr, "orders", true);

        let mut tx1 = mgr.begin();
        tx1.add("orders", b"a".to_vec(), b"1".to_vec()).unwrap();

        let mut tx2 = mgr.begin();
        assert!(!tx2.find("orders", b"a").unwrap());

        tx1.commit().unwrap();
    }

    #[test]
    fn conflicting_updates_to_the_same_key_one_wins_one_conflicts() {
        let mgr = manager();
        with_store(&mgr, "orders", true);
        let mut seed = mgr.begin();
        seed.add("orders", b"a".to_vec(), b"0".to_vec()).unwrap();
        seed.commit().unwrap();

        let mut tx1 = mgr.begin();
        tx1.update("orders", b"a", b"1".to_vec()).unwrap();

        let mut tx2 = mgr.begin();
        tx2.update("orders", b"a", b"2".to_vec()).unwrap();

        tx1.commit().unwrap();
        let err = tx2.commit().unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn unique_store_rejects_duplicate_key_within_one_transaction() {
        let mgr = manager();
        with_store(&mgr, "orders", true);
        let mut tx = mgr.begin();
        tx.add("orders", b"a".to_vec(), b"1".to_vec()).unwrap();
        let err = tx.add("orders", b"a".to_vec(), b"2".to_vec()).unwrap_err();
        assert!(matches!(err, Error::DuplicateKey));
    }

    #[test]
    fn commit_past_the_deadline_rolls_back_with_no_side_effects() {
        let mgr = manager();
        with_store(&mgr, "orders", true);
        let mut tx = Transaction::new(mgr.clone(), Uuid::new_v4(), now_ms() - 10_000_000, false);
        tx.add("orders", b"a".to_vec(), b"1".to_vec()).unwrap();
        let err = tx.commit().unwrap_err();
        assert!(err.is_timeout());

        let mut check = mgr.begin();
        assert!(!check.find("orders", b"a").unwrap());
    }

    #[test]
    fn remove_then_commit_is_visible_to_later_transactions() {
        let mgr = manager();
        with_store(&mgr, "orders", true);
        let mut seed = mgr.begin();
        seed.add("orders", b"a".to_vec(), b"1".to_vec()).unwrap();
        seed.commit().unwrap();

        let mut tx = mgr.begin();
        tx.remove("orders", b"a").unwrap();
        tx.commit().unwrap();

        let mut check = mgr.begin();
        assert!(!check.find("orders", b"a").unwrap());
    }

    #[test]
    fn rollback_discards_uncommitted_writes() {
        let mgr = manager();
        with_store(&mgr, "orders", true);
        let mut tx = mgr.begin();
        tx.add("orders", b"a".to_vec(), b"1".to_vec()).unwrap();
        tx.rollback();

        let mut check = mgr.begin();
        assert!(!check.find("orders", b"a").unwrap());
    }

    #[test]
    fn crash_during_phase_one_is_rolled_back_by_a_recovery_sweep() {
        let mgr = manager();
        with_store(&mgr, "orders", true);
        let mut seed = mgr.begin();
        seed.add("orders", b"a".to_vec(), b"1".to_vec()).unwrap();
        seed.commit().unwrap();

        // Simulate a crash between priority-log staging and the Registry
        // swap: the root node's Handle is staged to a new physical id and
        // logged, but `registry.update_no_locks` never runs.
        let root_id = mgr.store_repo.get("orders").unwrap().unwrap().root_node_id.unwrap();
        let expected = mgr.registry.get(root_id, None).unwrap().unwrap();
        let orphan_physical_id = Uuid::new_v4();
        mgr.blobs.put("orders_blobs", orphan_physical_id, b"staged-but-never-committed").unwrap();
        let mut staged = expected;
        staged.stage(orphan_physical_id, now_ms());
        let mut finalized = staged;
        finalized.commit();
        let tid = Uuid::new_v4();
        mgr.priority_log
            .record(
                tid,
                &[sop_durability::priority_log::PendingSwap {
                    expected,
                    new: finalized,
                    blob_table: "orders_blobs".to_string(),
                    applied: false,
                }],
                now_ms(),
            )
            .unwrap();

        let recovery = crate::recovery::RecoveryServicer::new(
            mgr.registry.clone(),
            mgr.blobs.clone(),
            mgr.cache.clone(),
            mgr.tx_log.clone(),
            mgr.priority_log.clone(),
        );
        assert_eq!(recovery.sweep(10).unwrap(), 1);
        assert!(mgr.priority_log.get(tid).unwrap().is_empty());

        // Nothing durable was ever written for this transaction, so the
        // Registry's view of the root is untouched and pre-T state reads
        // back unchanged, and the orphaned staged blob is collected.
        assert_eq!(mgr.registry.get(root_id, None).unwrap().unwrap(), expected);
        assert!(mgr.blobs.get("orders_blobs", orphan_physical_id).unwrap().is_none());
        let mut check = mgr.begin();
        assert!(check.find("orders", b"a").unwrap());
        assert_eq!(check.get_current_value("orders").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn out_of_line_value_round_trips_through_the_blob_store() {
        let mgr = manager();
        let mut info = StoreInfo::new("big", 8, true);
        info.is_value_data_in_node_segment = false;
        info.is_value_data_actively_persisted = true;
        mgr.store_repo.create_store(info).unwrap();

        let mut tx = mgr.begin();
        tx.add("big", b"a".to_vec(), vec![7u8; 4096]).unwrap();
        tx.commit().unwrap();

        let mut check = mgr.begin();
        assert!(check.find("big", b"a").unwrap());
        assert_eq!(check.get_current_value("big").unwrap(), Some(vec![7u8; 4096]));
    }
}
