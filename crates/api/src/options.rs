//! Store size presets and the [`StoreOptions`] builder, resolving how a
//! store's values are stored (inline, actively persisted out-of-line, or
//! cache-resident) before it's created (spec §4.3, §4.10).

use sop_core::store::{LeafLoadBalancing, StoreCacheConfig, StoreInfo};

/// Coarse size hint a caller picks per store, matching the three value
/// placement strategies spec §4.3 describes:
///
/// - `Small`: values live inline in the node segment. Cheapest reads, but
///   every node blob grows with its values, so this only suits small
///   values.
/// - `Medium`: values are out-of-line and the L2 global cache is their
///   durable copy of record — nothing is written to the blob store for the
///   value itself. Good for values too large to inline but not so large
///   (or so rarely re-read) that paying for durable storage on every write
///   makes sense.
/// - `Big`: values are out-of-line and durably persisted to the blob store
///   on every write. The global cache is not used for this tier — every
///   read of the value goes to the blob store, trading cache pressure for
///   a guarantee that the durable copy is always current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreSize {
    /// Inline values in the node segment.
    Small,
    /// Out-of-line, cache-is-durable values.
    Medium,
    /// Out-of-line, durably persisted values.
    Big,
}

/// Everything needed to create a store, built up via [`StoreOptions::new`]
/// and its builder methods, then turned into a [`StoreInfo`] by
/// [`StoreOptions::into_store_info`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    name: String,
    slot_length: u16,
    is_unique: bool,
    size: StoreSize,
    leaf_load_balancing: LeafLoadBalancing,
    cache_config: StoreCacheConfig,
    description: Option<String>,
    blob_store_base_folder_path: Option<String>,
    disable_blob_store_formatting: bool,
    disable_registry_store_formatting: bool,
    map_key_index_specification: Option<String>,
    is_primitive_key: bool,
}

impl StoreOptions {
    /// Start building options for a store named `name`, with `slot_length`
    /// fan-out (clamped to an even value per [`StoreInfo::clamp_slot_length`])
    /// and the given uniqueness and size policy.
    pub fn new(name: impl Into<String>, slot_length: u16, is_unique: bool, size: StoreSize) -> Self {
        Self {
            name: name.into(),
            slot_length,
            is_unique,
            size,
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

    /// Override the default leaf load-balancing policy.
    pub fn with_leaf_load_balancing(mut self, policy: LeafLoadBalancing) -> Self {
        self.leaf_load_balancing = policy;
        self
    }

    /// Override the default cache durations. Clamped to the minimums
    /// [`StoreCacheConfig::clamped`] enforces.
    pub fn with_cache_config(mut self, config: StoreCacheConfig) -> Self {
        self.cache_config = config.clamped();
        self
    }

    /// Attach a free-text description, carried through to `StoreInfo` for
    /// catalogs/diagnostics only.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Root this store's blob table under `path` instead of the backend's
    /// default layout. Only meaningful for filesystem-addressed backends.
    pub fn with_blob_store_base_folder_path(mut self, path: impl Into<String>) -> Self {
        self.blob_store_base_folder_path = Some(path.into());
        self
    }

    /// Skip the blob store's table/directory formatting when this store is
    /// created (e.g. a pre-provisioned namespace).
    pub fn with_blob_store_formatting_disabled(mut self) -> Self {
        self.disable_blob_store_formatting = true;
        self
    }

    /// Skip the registry store's table formatting when this store is
    /// created.
    pub fn with_registry_store_formatting_disabled(mut self) -> Self {
        self.disable_registry_store_formatting = true;
        self
    }

    /// Declare the index specification string a `ProxyComparer` should use
    /// for this store's keys, instead of plain byte order. The caller is
    /// responsible for registering the ordering function this spec denotes
    /// (see `sop_core::compare::ProxyComparer::from_store_info`).
    pub fn with_map_key_index_specification(mut self, spec: impl Into<String>) -> Self {
        self.map_key_index_specification = Some(spec.into());
        self
    }

    /// Mark this store's keys as a primitive fixed-width type.
    pub fn with_primitive_key(mut self, is_primitive_key: bool) -> Self {
        self.is_primitive_key = is_primitive_key;
        self
    }

    /// Build the [`StoreInfo`] this configuration describes, ready to hand
    /// to a `StoreRepository`.
    pub fn into_store_info(self) -> StoreInfo {
        let mut info = StoreInfo::new(self.name, self.slot_length, self.is_unique);
        info.leaf_load_balancing = self.leaf_load_balancing;
        info.cache_config = self.cache_config;
        info.description = self.description;
        info.blob_store_base_folder_path = self.blob_store_base_folder_path;
        info.disable_blob_store_formatting = self.disable_blob_store_formatting;
        info.disable_registry_store_formatting = self.disable_registry_store_formatting;
        info.map_key_index_specification = self.map_key_index_specification;
        info.is_primitive_key = self.is_primitive_key;
        match self.size {
            StoreSize::Small => {
                info.is_value_data_in_node_segment = true;
                info.is_value_data_actively_persisted = false;
                info.is_value_data_globally_cached = false;
            }
            StoreSize::Medium => {
                info.is_value_data_in_node_segment = false;
                info.is_value_data_actively_persisted = false;
                info.is_value_data_globally_cached = true;
            }
            StoreSize::Big => {
                info.is_value_data_in_node_segment = false;
                info.is_value_data_actively_persisted = true;
                info.is_value_data_globally_cached = false;
            }
        }
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_store_is_inline() {
        let info = StoreOptions::new("s", 8, true, StoreSize::Small).into_store_info();
        assert!(info.is_value_data_in_node_segment);
        assert!(!info.is_value_data_actively_persisted);
    }

    #[test]
    fn medium_store_is_out_of_line_and_cache_is_durable() {
        let info = StoreOptions::new("m", 8, true, StoreSize::Medium).into_store_info();
        assert!(!info.is_value_data_in_node_segment);
        assert!(!info.is_value_data_actively_persisted);
        assert!(info.is_value_data_globally_cached);
    }

    #[test]
    fn big_store_is_out_of_line_and_durably_persisted() {
        let info = StoreOptions::new("b", 8, true, StoreSize::Big).into_store_info();
        assert!(!info.is_value_data_in_node_segment);
        assert!(info.is_value_data_actively_persisted);
        assert!(!info.is_value_data_globally_cached);
    }

    #[test]
    fn builder_methods_carry_through_to_store_info() {
        let info = StoreOptions::new("b", 8, true, StoreSize::Small)
            .with_description("order ledger")
            .with_blob_store_base_folder_path("/data/orders")
            .with_blob_store_formatting_disabled()
            .with_registry_store_formatting_disabled()
            .with_map_key_index_specification("composite:customer,date")
            .with_primitive_key(true)
            .into_store_info();
        assert_eq!(info.description.as_deref(), Some("order ledger"));
        assert_eq!(info.blob_store_base_folder_path.as_deref(), Some("/data/orders"));
        assert!(info.disable_blob_store_formatting);
        assert!(info.disable_registry_store_formatting);
        assert_eq!(info.map_key_index_specification.as_deref(), Some("composite:customer,date"));
        assert!(info.is_primitive_key);
    }
}
