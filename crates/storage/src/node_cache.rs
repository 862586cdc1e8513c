//! L1: the process-local node cache (spec §4.6).
//!
//! Keyed strictly by *physical* id, never by logical id — a caller that
//! doesn't first resolve a logical id to its current physical id through
//! the [`sop_core::traits::Registry`] has no way to ask L1 for the wrong
//! (stale) version, because there's no logical-id entry point to ask
//! through. Bounded in size; safe to purge at any time since it's never the
//! source of truth.

use parking_lot::Mutex;
use sop_core::node::Node;
use std::collections::VecDeque;
use uuid::Uuid;

struct Inner {
    map: rustc_hash::FxHashMap<Uuid, Node>,
    order: VecDeque<Uuid>,
    capacity: usize,
}

/// Bounded, physical-id-keyed in-process node cache with FIFO eviction.
pub struct L1NodeCache {
    inner: Mutex<Inner>,
}

impl L1NodeCache {
    /// Build a cache holding at most `capacity` nodes.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: rustc_hash::FxHashMap::default(),
                order: VecDeque::new(),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Fetch a node by its physical id, if cached.
    pub fn get(&self, physical_id: Uuid) -> Option<Node> {
        self.inner.lock().map.get(&physical_id).cloned()
    }

    /// Cache (or refresh) a node under its physical id.
    pub fn put(&self, physical_id: Uuid, node: Node) {
        let mut inner = self.inner.lock();
        if !inner.map.contains_key(&physical_id) {
            inner.order.push_back(physical_id);
        }
        inner.map.insert(physical_id, node);
        while inner.map.len() > inner.capacity {
            if let Some(evict) = inner.order.pop_front() {
                inner.map.remove(&evict);
            } else {
                break;
            }
        }
    }

    /// Drop a specific physical id from the cache.
    pub fn invalidate(&self, physical_id: Uuid) {
        let mut inner = self.inner.lock();
        inner.map.remove(&physical_id);
        inner.order.retain(|id| *id != physical_id);
    }

    /// Drop everything. Always safe: nothing depends on L1 surviving a
    /// purge for correctness.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.order.clear();
    }

    /// Current number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    /// `true` when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
