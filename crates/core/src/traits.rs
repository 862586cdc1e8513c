//! Backend-abstraction seams.
//!
//! Every trait here is implemented by exactly one in-process default
//! (`sop-engine` for [`NodeRepository`]/[`ItemActionTracker`]/[`Registry`],
//! `sop-concurrency` for [`StoreRepository`], `sop-storage` for
//! [`BlobStore`]/[`Cache`]) but the core engine and transaction manager only
//! ever depend on the trait objects, so a Cassandra- or filesystem-backed
//! implementation can be swapped in without touching commit logic.

use crate::error::Result;
use crate::handle::Handle;
use crate::node::Node;
use crate::store::StoreInfo;
use std::time::Duration;
use uuid::Uuid;

/// Content-addressed blob storage keyed by `(table, id)`. The only
/// persistence seam the B-Tree engine and transaction manager touch for
/// node and out-of-line value bytes.
pub trait BlobStore: Send + Sync {
    /// Fetch a blob, if present.
    fn get(&self, table: &str, id: Uuid) -> Result<Option<Vec<u8>>>;
    /// Write (or overwrite) a blob.
    fn put(&self, table: &str, id: Uuid, bytes: &[u8]) -> Result<()>;
    /// Remove a blob. Not an error if it doesn't exist.
    fn remove(&self, table: &str, id: Uuid) -> Result<()>;
    /// Ensure the namespace for `table` exists (directory, keyspace, etc).
    fn create_table(&self, table: &str) -> Result<()>;
    /// Remove a namespace and everything in it.
    fn remove_table(&self, table: &str) -> Result<()>;
}

/// An opaque key used to request an OOA lock from a [`Cache`] backend.
/// Typically `"lock:{resource}"` per spec §6.2.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockKey(pub String);

impl LockKey {
    /// Build a lock key for a registry resource.
    pub fn for_resource(resource: &str) -> Self {
        LockKey(format!("lock:{resource}"))
    }
}

/// The L2 (distributed/shared) cache coordinator.
///
/// `Cache` is advisory for plain get/set/delete — correctness never depends
/// on a hit. The `dual_lock`/`unlock`/`is_locked` family implements the
/// Optimistic Orchestration Algorithm: a lock is a UUID value written under
/// a `LockKey` with a TTL, and is only considered *owned* once a follow-up
/// read confirms the same UUID is still there (the "fetch/set/fetch"
/// protocol — there is no native compare-and-swap requirement on the
/// backend).
pub trait Cache: Send + Sync {
    /// Fetch raw bytes for `key`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// Store raw bytes for `key` with a TTL.
    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;
    /// Remove `key`.
    fn delete(&self, key: &str) -> Result<()>;

    /// Fetch and deserialize a value for `key`, optionally extending its TTL
    /// ("sliding" expiry) to `extend_ttl` on a hit.
    fn get_struct(&self, key: &str, extend_ttl: Option<Duration>) -> Result<Option<Vec<u8>>> {
        let v = self.get(key)?;
        if v.is_some() {
            if let Some(ttl) = extend_ttl {
                if let Some(bytes) = &v {
                    self.set(key, bytes, ttl)?;
                }
            }
        }
        Ok(v)
    }

    /// Serialize and store a struct for `key` with a TTL.
    fn set_struct(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.set(key, value, ttl)
    }

    /// Build the lock keys that would be used to lock `resources`.
    fn create_lock_keys(&self, resources: &[String]) -> Vec<LockKey> {
        resources.iter().map(|r| LockKey::for_resource(r)).collect()
    }

    /// Attempt to acquire all of `keys` atomically (as a set) within
    /// `duration`. Returns `Ok(true)` on full success. On partial failure,
    /// returns `Ok(false)` together with the first key that was already
    /// held by someone else, and releases any locks this call itself
    /// acquired before the conflict.
    fn dual_lock(
        &self,
        duration: Duration,
        keys: &[LockKey],
    ) -> Result<(bool, Option<LockKey>)>;

    /// Release `keys`. Never errors on a key that isn't held.
    fn unlock(&self, keys: &[LockKey]) -> Result<()>;

    /// `true` if any of `keys` is currently held by anyone.
    fn is_locked(&self, keys: &[LockKey]) -> Result<bool>;
}

/// Per-transaction repository for B-Tree node blobs, layered over the L1
/// process-local node cache, the L2 [`Cache`], and a [`BlobStore`].
///
/// Implementations MUST consult the [`Registry`] for the current
/// [`Handle`] before trusting any L1/L2 hit — see
/// [`NodeRepository::get`]'s documented lookup order. This is what makes a
/// stale L1 entry impossible to observe: L1 is keyed by *physical* id, and
/// only a physical id that the Registry currently calls active is ever
/// looked up there.
pub trait NodeRepository {
    /// Fetch the current version of the node named by `logical_id`.
    ///
    /// Lookup order: (1) this transaction's own modified-node working set,
    /// (2) the Registry, to learn the current active physical id, (3) the
    /// L1 cache keyed by that physical id, (4) the L2 cache, (5) the
    /// [`BlobStore`]. Only a blob matching the handle's active physical id
    /// is ever trusted as the answer.
    fn get(&mut self, logical_id: Uuid) -> Result<Option<Node>>;

    /// Record a brand-new node as part of this transaction's working set
    /// (not yet visible to anyone else).
    fn put_new(&mut self, node: Node) -> Result<()>;

    /// Record an update to an existing node as part of this transaction's
    /// working set.
    fn update(&mut self, node: Node) -> Result<()>;

    /// Record a removal as part of this transaction's working set.
    fn remove(&mut self, logical_id: Uuid) -> Result<()>;

    /// Record that `node` is the first node of a brand-new store (no prior
    /// root to replace).
    fn commit_new_root(&mut self, node: Node) -> Result<()>;

    /// Logical ids added by this transaction so far.
    fn added(&self) -> Vec<Uuid>;
    /// Logical ids updated by this transaction so far.
    fn updated(&self) -> Vec<Uuid>;
    /// Logical ids removed by this transaction so far.
    fn removed(&self) -> Vec<Uuid>;
    /// Logical ids merely fetched (read, not written) by this transaction
    /// so far — these still need a phase-1 version recheck.
    fn fetched(&self) -> Vec<Uuid>;
}

/// What a transaction did to one item, recorded for phase-1 recheck and
/// phase-2 registry updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemAction {
    /// Read without modification.
    Get,
    /// Inserted.
    Add,
    /// Modified.
    Update,
    /// Deleted.
    Remove,
}

/// One tracked item action.
#[derive(Debug, Clone)]
pub struct TrackedItemAction {
    /// The item's stable id.
    pub item_id: Uuid,
    /// What was done to it.
    pub action: ItemAction,
    /// The item's version as observed when this transaction first touched
    /// it (used for the phase-1 recheck).
    pub observed_version: u32,
    /// The version the item will have after a successful write, for
    /// `Add`/`Update`. `None` for `Get`/`Remove`.
    pub new_version_if_write: Option<u32>,
    /// Serialized key, for diagnostics and conflict messages.
    pub key: Vec<u8>,
}

/// Per-transaction tracker of item-level actions, feeding both the phase-1
/// version recheck and the phase-2 registry update set.
pub trait ItemActionTracker {
    /// Record an action against `item_id`.
    fn record(&mut self, action: TrackedItemAction);
    /// All actions recorded so far, in the order they were recorded.
    fn actions(&self) -> &[TrackedItemAction];
    /// Clear all recorded actions (used after a successful commit or an
    /// explicit rollback).
    fn clear(&mut self);
}

/// Management of [`StoreInfo`] records: creation, lookup, and the
/// deadlock-free multi-store update protocol described in spec §4.4.
pub trait StoreRepository {
    /// Create a brand-new, empty store record and its blob-store namespace.
    fn create_store(&self, info: StoreInfo) -> Result<()>;
    /// Remove a store record and its blob-store namespace.
    fn remove_store(&self, name: &str) -> Result<()>;
    /// Fetch one store by name.
    fn get(&self, name: &str) -> Result<Option<StoreInfo>>;
    /// Fetch one store by name, specifying how long the result may be
    /// served from cache.
    fn get_with_ttl(&self, name: &str, ttl: Duration) -> Result<Option<StoreInfo>>;
    /// Fetch every known store.
    fn get_all(&self) -> Result<Vec<StoreInfo>>;
    /// Remove a store record (but not necessarily its blob namespace — see
    /// [`StoreRepository::remove_store`] for that).
    fn remove(&self, name: &str) -> Result<()>;

    /// Apply `updates` (new `StoreInfo` snapshots, each carrying a
    /// `count_delta` to fold in) as one unit: sorted by name first (so two
    /// transactions touching overlapping store sets always take locks in
    /// the same order and cannot deadlock), each with a per-store OOA lock
    /// held for up to `lock_ttl`. If any update in the middle of the
    /// sequence fails, every update already applied in this call is undone
    /// using the pre-update snapshot before the error is returned.
    fn update(&self, updates: Vec<StoreInfo>, lock_ttl: Duration) -> Result<Vec<StoreInfo>>;
}

/// The authoritative logical-id → [`Handle`] map.
pub trait Registry {
    /// Fetch the current handle for `logical_id`. Tries the L2 cache first
    /// (optionally refreshing its TTL on a hit), then falls back to the
    /// backend.
    fn get(&self, logical_id: Uuid, refresh_ttl: Option<Duration>) -> Result<Option<Handle>>;
    /// Insert a brand-new handle. Fails with [`crate::error::Error::Conflict`]
    /// if one already exists for this logical id.
    fn add(&self, handle: Handle) -> Result<()>;
    /// Compare-and-swap update: succeeds only if the backend's current
    /// handle for `new.logical_id` equals `expected` exactly (the
    /// two-points-in-time recheck condition). Takes (and releases) a
    /// per-key L2 lock for the duration of the call.
    fn update(&self, expected: Handle, new: Handle, lock_ttl: Duration) -> Result<()>;
    /// Apply a batch of (expected, new) handle pairs without taking
    /// per-key locks (the caller — the transaction manager — already holds
    /// the OOA locks for every key in the batch). If `all_or_nothing` and
    /// the backend can guarantee atomic multi-key application, either every
    /// pair applies or none do; otherwise pairs are applied in the
    /// supplied order and the caller's transaction log is relied on to
    /// finish or undo a partial batch after a crash.
    fn update_no_locks(&self, pairs: Vec<(Handle, Handle)>, all_or_nothing: bool) -> Result<()>;
    /// Remove a handle.
    fn remove(&self, logical_id: Uuid) -> Result<()>;
    /// Ensure replicas (if any) observe this handle. A no-op when the
    /// backend has native replication.
    fn replicate(&self, _handle: &Handle) -> Result<()> {
        Ok(())
    }
}
