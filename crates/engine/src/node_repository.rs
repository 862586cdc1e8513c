//! Default [`sop_core::traits::NodeRepository`]: one instance per
//! transaction, layering a transaction-local working set over the L1 node
//! cache, the Registry, and a [`BlobStore`] (spec §4.2).

use sop_core::error::{Error, Result};
use sop_core::handle::Handle;
use sop_core::node::Node;
use sop_core::traits::{BlobStore, NodeRepository, Registry};
use sop_storage::L1NodeCache;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

/// Per-transaction node repository.
pub struct TxNodeRepository {
    registry: Arc<dyn Registry>,
    l1: Arc<L1NodeCache>,
    blobs: Arc<dyn BlobStore>,
    table: String,

    working: HashMap<Uuid, Node>,
    added: HashSet<Uuid>,
    updated: HashSet<Uuid>,
    removed: HashSet<Uuid>,
    fetched: HashSet<Uuid>,
    /// The `Handle` observed the first time this transaction resolved a
    /// logical id through the Registry — the baseline the transaction
    /// manager rechecks against at phase 1 and phase 2.
    observed_handles: HashMap<Uuid, Handle>,
}

impl TxNodeRepository {
    /// Build a node repository for one transaction, against the store
    /// named by `table` (used both as the blob table and as a namespace for
    /// diagnostics).
    pub fn new(
        registry: Arc<dyn Registry>,
        l1: Arc<L1NodeCache>,
        blobs: Arc<dyn BlobStore>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            l1,
            blobs,
            table: table.into(),
            working: HashMap::new(),
            added: HashSet::new(),
            updated: HashSet::new(),
            removed: HashSet::new(),
            fetched: HashSet::new(),
            observed_handles: HashMap::new(),
        }
    }

    fn decode(bytes: &[u8]) -> Result<Node> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// The working-set snapshot of everything touched by this transaction,
    /// for the transaction manager to read back during phase 1/phase 2.
    pub fn working_node(&self, logical_id: Uuid) -> Option<&Node> {
        self.working.get(&logical_id)
    }

    /// The `Handle` this transaction observed the first time it resolved
    /// `logical_id`, if it ever did (never set for brand-new, not-yet-
    /// registered logical ids from `put_new`).
    pub fn observed_handle(&self, logical_id: Uuid) -> Option<Handle> {
        self.observed_handles.get(&logical_id).copied()
    }

    /// Table name this repository resolves blobs against.
    pub fn table(&self) -> &str {
        &self.table
    }
}

impl NodeRepository for TxNodeRepository {
    fn get(&mut self, logical_id: Uuid) -> Result<Option<Node>> {
        if let Some(n) = self.working.get(&logical_id) {
            return Ok(Some(n.clone()));
        }
        if self.removed.contains(&logical_id) {
            return Ok(None);
        }

        // Registry is consulted before any cache is trusted: the physical
        // id it returns is the only key L1/BlobStore may legitimately be
        // asked about.
        let handle = match self.registry.get(logical_id, None)? {
            Some(h) if !h.is_deleted => h,
            _ => return Ok(None),
        };
        self.observed_handles.entry(logical_id).or_insert(handle);
        let physical_id = handle.active_physical_id();

        if let Some(node) = self.l1.get(physical_id) {
            self.fetched.insert(logical_id);
            return Ok(Some(node));
        }

        let bytes = match self.blobs.get(&self.table, physical_id)? {
            Some(b) => b,
            None => return Err(Error::NotFound),
        };
        let node = Self::decode(&bytes)?;
        self.l1.put(physical_id, node.clone());
        self.fetched.insert(logical_id);
        Ok(Some(node))
    }

    fn put_new(&mut self, node: Node) -> Result<()> {
        self.added.insert(node.id);
        self.working.insert(node.id, node);
        Ok(())
    }

    fn update(&mut self, node: Node) -> Result<()> {
        self.updated.insert(node.id);
        self.working.insert(node.id, node);
        Ok(())
    }

    fn remove(&mut self, logical_id: Uuid) -> Result<()> {
        self.working.remove(&logical_id);
        self.added.remove(&logical_id);
        self.updated.remove(&logical_id);
        self.removed.insert(logical_id);
        Ok(())
    }

    fn commit_new_root(&mut self, node: Node) -> Result<()> {
        self.put_new(node)
    }

    fn added(&self) -> Vec<Uuid> {
        self.added.iter().copied().collect()
    }

    fn updated(&self) -> Vec<Uuid> {
        self.updated.iter().copied().collect()
    }

    fn removed(&self) -> Vec<Uuid> {
        self.removed.iter().copied().collect()
    }

    fn fetched(&self) -> Vec<Uuid> {
        self.fetched.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;
    use sop_core::handle::Handle;
    use sop_storage::{InMemoryL2Cache, MemoryBlobStore};
    use std::time::Duration;

    fn repo() -> (TxNodeRepository, Arc<dyn Registry>, Arc<dyn BlobStore>) {
        let (tx_repo, registry, blobs, _l1) = repo_with_l1();
        (tx_repo, registry, blobs)
    }

    fn repo_with_l1() -> (TxNodeRepository, Arc<dyn Registry>, Arc<dyn BlobStore>, Arc<L1NodeCache>) {
        let registry: Arc<dyn Registry> =
            Arc::new(InMemoryRegistry::new(Arc::new(InMemoryL2Cache::new()), Duration::from_secs(600)));
        let blobs: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let l1 = Arc::new(L1NodeCache::new(100));
        let tx_repo = TxNodeRepository::new(registry.clone(), l1.clone(), blobs.clone(), "orders");
        (tx_repo, registry, blobs, l1)
    }

    #[test]
    fn put_new_is_visible_to_get_before_commit() {
        let (mut tx, _registry, _blobs) = repo();
        let node = Node::new_leaf(4);
        let id = node.id;
        tx.put_new(node).unwrap();
        assert!(tx.get(id).unwrap().is_some());
        assert_eq!(tx.added(), vec![id]);
    }

    #[test]
    fn get_falls_through_registry_l1_and_blobstore() {
        let (mut tx, registry, blobs) = repo();
        let node = Node::new_leaf(4);
        let handle = Handle::new(node.id, Uuid::new_v4());
        registry.add(handle).unwrap();
        blobs
            .put("orders", handle.active_physical_id(), &serde_json::to_vec(&node).unwrap())
            .unwrap();

        let fetched = tx.get(node.id).unwrap().unwrap();
        assert_eq!(fetched.id, node.id);
        assert_eq!(tx.fetched(), vec![node.id]);
    }

    #[test]
    fn get_of_deleted_handle_returns_none() {
        let (mut tx, registry, _blobs) = repo();
        let mut handle = Handle::new(Uuid::new_v4(), Uuid::new_v4());
        handle.is_deleted = true;
        registry.add(handle).unwrap();
        assert!(tx.get(handle.logical_id).unwrap().is_none());
    }

    #[test]
    fn stale_l1_entry_for_an_old_physical_id_is_never_served() {
        let (mut tx, registry, blobs, l1) = repo_with_l1();
        let logical_id = Uuid::new_v4();

        let old_physical = Uuid::new_v4();
        let mut stale_node = Node::new_leaf(4);
        stale_node.id = logical_id;
        l1.put(old_physical, stale_node.clone());

        // A second transaction commits a new version: new physical id, new
        // blob content, new Handle — but L1 (shared process-wide) still
        // holds the stale entry under `old_physical`.
        let new_physical = Uuid::new_v4();
        let mut fresh_node = Node::new_leaf(4);
        fresh_node.id = logical_id;
        fresh_node.insert_into_free_slot(sop_core::item::Item::new_inline(b"k".to_vec(), b"v".to_vec()));
        registry.add(Handle::new(logical_id, new_physical)).unwrap();
        blobs
            .put("orders", new_physical, &serde_json::to_vec(&fresh_node).unwrap())
            .unwrap();

        let fetched = tx.get(logical_id).unwrap().unwrap();
        assert_eq!(fetched.count, 1);
        assert_eq!(stale_node.count, 0);

        // L1 still has the stale entry under the old key untouched, but
        // it's now cached fresh under the new physical id too.
        assert!(l1.get(old_physical).is_some());
        assert!(l1.get(new_physical).is_some());
    }

    #[test]
    fn remove_then_get_returns_none_even_if_working_set_had_it() {
        let (mut tx, _r, _b) = repo();
        let node = Node::new_leaf(4);
        let id = node.id;
        tx.put_new(node).unwrap();
        tx.remove(id).unwrap();
        assert!(tx.get(id).unwrap().is_none());
        assert_eq!(tx.removed(), vec![id]);
        assert!(tx.added().is_empty());
    }
}
