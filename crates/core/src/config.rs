//! Process-wide defaults, constructed explicitly rather than read from a
//! hidden singleton (spec §9).

use crate::store::StoreCacheConfig;
use std::time::Duration;

/// Default commit deadline when a transaction does not set its own
/// (spec §4.7: 15 minutes).
pub const DEFAULT_COMMIT_MAX_DURATION: Duration = Duration::from_secs(15 * 60);

/// Default jitter base unit for retry backoff (spec §9: 20ms).
pub const DEFAULT_JITTER_BASE: Duration = Duration::from_millis(20);

/// Default bounded capacity of the L1 node cache, in entries.
pub const DEFAULT_L1_CAPACITY: usize = 10_000;

/// Process-wide defaults. Pass an explicit instance into whatever
/// collaborator needs it (cache factory, transaction manager) — there is no
/// global/static accessor.
#[derive(Debug, Clone, Copy)]
pub struct GlobalConfig {
    /// Default cache durations applied to stores that don't override them.
    pub default_cache_config: StoreCacheConfig,
    /// Default per-transaction commit deadline.
    pub commit_max_duration: Duration,
    /// Base unit multiplied by a random jitter factor (1x-4x) for
    /// transient-error retry backoff.
    pub jitter_base: Duration,
    /// Bounded capacity of the L1 node cache.
    pub l1_capacity: usize,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            default_cache_config: StoreCacheConfig::default(),
            commit_max_duration: DEFAULT_COMMIT_MAX_DURATION,
            jitter_base: DEFAULT_JITTER_BASE,
            l1_capacity: DEFAULT_L1_CAPACITY,
        }
    }
}
