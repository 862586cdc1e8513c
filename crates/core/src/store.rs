//! Persisted per-store metadata: [`StoreInfo`] and its cache configuration.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minimum allowed caching duration for any cache entry (spec: 5 minutes).
pub const MIN_CACHING_DURATION_SECS: u64 = 5 * 60;

/// Default minimum duration for registry cache entries (spec: 10 minutes —
/// commit correctness depends on the registry cache being assisted, not
/// bypassed, for this long).
pub const DEFAULT_REGISTRY_CACHE_DURATION_SECS: u64 = 10 * 60;

/// Minimum `SlotLength`.
pub const MIN_SLOT_LENGTH: u16 = 2;
/// Maximum `SlotLength`.
pub const MAX_SLOT_LENGTH: u16 = 10_000;

/// Leaf load-balancing policy: when a leaf insert would overflow, prefer
/// redistributing to a sibling with spare capacity over splitting, keeping
/// the tree's average leaf load in the target band instead of dropping to
/// 50% on every split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafLoadBalancing {
    /// Whether sibling redistribution is attempted before a split.
    pub enabled: bool,
    /// Target lower bound on leaf load factor (percent, e.g. 62).
    pub target_min_percent: u8,
    /// Target upper bound on leaf load factor (percent, e.g. 75).
    pub target_max_percent: u8,
}

impl Default for LeafLoadBalancing {
    fn default() -> Self {
        Self {
            enabled: true,
            target_min_percent: 62,
            target_max_percent: 75,
        }
    }
}

/// Cache durations and sliding-TTL flags for one store.
///
/// `registry_duration` has a minimum of
/// [`DEFAULT_REGISTRY_CACHE_DURATION_SECS`] enforced by
/// [`StoreCacheConfig::clamped`] since the commit protocol's two-points-in-
/// time recheck relies on the registry cache staying warm across a typical
/// commit. All non-negative durations are clamped up to
/// [`MIN_CACHING_DURATION_SECS`]; a negative `value_duration_secs` is the
/// documented sentinel for "disable global value caching entirely" and is
/// left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCacheConfig {
    /// Node (L1/L2) cache duration, seconds.
    pub node_duration_secs: u64,
    /// Registry (Handle) cache duration, seconds.
    pub registry_duration_secs: u64,
    /// StoreInfo cache duration, seconds.
    pub store_info_duration_secs: u64,
    /// Value cache duration, seconds. `-1` disables global value caching.
    pub value_duration_secs: i64,
    /// Extend TTL on every read ("sliding" expiry) rather than only on
    /// write, for node/registry/store-info entries.
    pub is_sliding: bool,
}

impl Default for StoreCacheConfig {
    fn default() -> Self {
        Self {
            node_duration_secs: MIN_CACHING_DURATION_SECS,
            registry_duration_secs: DEFAULT_REGISTRY_CACHE_DURATION_SECS,
            store_info_duration_secs: MIN_CACHING_DURATION_SECS,
            value_duration_secs: MIN_CACHING_DURATION_SECS as i64,
            is_sliding: true,
        }
    }
}

impl StoreCacheConfig {
    /// Return a copy with all durations raised to their respective minimums.
    pub fn clamped(mut self) -> Self {
        self.node_duration_secs = self.node_duration_secs.max(MIN_CACHING_DURATION_SECS);
        self.registry_duration_secs = self
            .registry_duration_secs
            .max(DEFAULT_REGISTRY_CACHE_DURATION_SECS);
        self.store_info_duration_secs = self.store_info_duration_secs.max(MIN_CACHING_DURATION_SECS);
        if self.value_duration_secs >= 0 {
            self.value_duration_secs = self
                .value_duration_secs
                .max(MIN_CACHING_DURATION_SECS as i64);
        }
        self
    }

    /// `true` when global value caching is disabled (sentinel `-1`).
    pub fn value_caching_disabled(&self) -> bool {
        self.value_duration_secs < 0
    }
}

/// Persisted per-store record. Keyed by `name` in the backend's StoreInfo
/// table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreInfo {
    /// Store name, unique within a backend.
    pub name: String,
    /// Fixed fan-out of every node in this store's B-Tree; always even, in
    /// `[MIN_SLOT_LENGTH, MAX_SLOT_LENGTH]`.
    pub slot_length: u16,
    /// Whether duplicate keys are rejected.
    pub is_unique: bool,
    /// Logical id of the current root node. `None` until the first item is
    /// added (see [`StoreInfo::is_empty`]).
    pub root_node_id: Option<Uuid>,
    /// Persisted item count, reconciled with in-flight [`StoreInfo::count_delta`]
    /// at read time: `effective_count = count + count_delta`.
    pub count: i64,
    /// Ephemeral, not persisted: sum of uncommitted insert/delete deltas
    /// from in-flight transactions touching this store. Always reset to 0
    /// immediately after being folded into `count` at commit.
    #[serde(skip)]
    pub count_delta: i64,
    /// Last-modified timestamp, seconds since epoch.
    pub timestamp: i64,
    /// Name of the blob table holding this store's node/value blobs.
    pub blob_table: String,
    /// Name of the registry table holding this store's handles.
    pub registry_table: String,
    /// `true` if item values are stored inline in the node segment (small
    /// stores); `false` if out-of-line.
    pub is_value_data_in_node_segment: bool,
    /// `true` if out-of-line values are durably persisted as their own blob
    /// as part of the commit (big stores); `false` if they are only ever
    /// cached (medium stores, where the global cache is the durable copy
    /// of record for the value — used together with
    /// `is_value_data_globally_cached`).
    pub is_value_data_actively_persisted: bool,
    /// `true` if out-of-line values are eligible for the L2 global cache.
    pub is_value_data_globally_cached: bool,
    /// Leaf load-balancing policy for this store.
    pub leaf_load_balancing: LeafLoadBalancing,
    /// Cache durations for this store.
    pub cache_config: StoreCacheConfig,
    /// Free-text description, for catalogs/diagnostics. Never interpreted
    /// by the engine.
    pub description: Option<String>,
    /// Base folder a filesystem `BlobStore` should root this store's blob
    /// table under, overriding the backend's default layout. Ignored by
    /// backends that don't address blobs by filesystem path.
    pub blob_store_base_folder_path: Option<String>,
    /// Skip the blob store's usual table/directory formatting on creation
    /// (e.g. because it was pre-provisioned out of band).
    pub disable_blob_store_formatting: bool,
    /// Skip the registry store's usual table formatting on creation.
    pub disable_registry_store_formatting: bool,
    /// Declarative index specification string identifying the ordering a
    /// [`crate::compare::ProxyComparer`] should use for this store's keys,
    /// if not plain byte order. See
    /// [`crate::compare::ProxyComparer::from_store_info`].
    pub map_key_index_specification: Option<String>,
    /// `true` if keys are a primitive fixed-width type (affects how a
    /// caller-supplied comparer is expected to interpret key bytes).
    pub is_primitive_key: bool,
}

impl StoreInfo {
    /// Construct a `StoreInfo` for a brand-new, empty store. `slot_length`
    /// is clamped to even and to `[MIN_SLOT_LENGTH, MAX_SLOT_LENGTH]`.
    pub fn new(name: impl Into<String>, slot_length: u16, is_unique: bool) -> Self {
        let name = name.into();
        Self {
            blob_table: format!("{name}_blobs"),
            registry_table: format!("{name}_registry"),
            name,
            slot_length: Self::clamp_slot_length(slot_length),
            is_unique,
            root_node_id: None,
            count: 0,
            count_delta: 0,
            timestamp: 0,
            is_value_data_in_node_segment: true,
            is_value_data_actively_persisted: false,
            is_value_data_globally_cached: false,
            leaf_load_balancing: LeafLoadBalancing::default(),
            cache_config: StoreCacheConfig::default(),
            description: None,
            blob_store_base_folder_path: None,
            disable_blob_store_formatting: false,
            disable_registry_store_formatting: false,
            map_key_index_specification: None,
            is_primitive_key: false,
        }
    }

    /// Clamp a requested slot length to an even value within
    /// `[MIN_SLOT_LENGTH, MAX_SLOT_LENGTH]`.
    pub fn clamp_slot_length(requested: u16) -> u16 {
        let clamped = requested.clamp(MIN_SLOT_LENGTH, MAX_SLOT_LENGTH);
        if clamped % 2 == 1 {
            // round down, staying >= MIN_SLOT_LENGTH since MIN_SLOT_LENGTH is even
            clamped - 1
        } else {
            clamped
        }
    }

    /// A store with no root node has never had a B-Tree created for it.
    pub fn is_empty(&self) -> bool {
        self.root_node_id.is_none()
    }

    /// Count as it should be observed by a reader: persisted count plus any
    /// not-yet-folded-in delta from concurrent in-flight transactions.
    pub fn effective_count(&self) -> i64 {
        self.count + self.count_delta
    }
}
