//! Recovery and cleanup servicer (spec §4.8, §4.9): sweeps the priority log
//! for transactions whose phase-2 outcome a crash left undetermined, and
//! decides whether each pending swap rolled back on its own (the registry
//! still shows `expected`) or completed (the registry already shows `new`).

use crate::clock::now_ms;
use sop_core::error::Result;
use sop_core::traits::{BlobStore, Cache, LockKey, Registry};
use sop_durability::priority_log::PendingSwap;
use sop_durability::{PriorityLog, TransactionLog};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Cache key used to detect that the L2 cache (and therefore every OOA lock
/// and cached registry/store-info entry it held) was lost and restarted
/// since this process last ran a sweep.
const RESTART_MARKER_KEY: &str = "sop:recovery:notrestarted";
const RESTART_MARKER_TTL: Duration = Duration::from_secs(365 * 24 * 3600);

/// How long a sweeper holds the OOA lock claiming one transaction for
/// itself, so two sweepers running against the same logical partition never
/// resolve (and double-clean the blobs of) the same transaction.
const CLAIM_LOCK_TTL: Duration = Duration::from_secs(5 * 60);

fn claim_key(tid: Uuid) -> LockKey {
    LockKey::for_resource(&format!("recovery-claim:{tid}"))
}

/// Background sweeper for crashed/abandoned transactions. Safe to run from
/// a periodic task in server mode, or once at startup in standalone mode —
/// both call [`RecoveryServicer::sweep`].
pub struct RecoveryServicer {
    registry: Arc<dyn Registry>,
    blobs: Arc<dyn BlobStore>,
    cache: Arc<dyn Cache>,
    tx_log: Arc<TransactionLog>,
    priority_log: Arc<PriorityLog>,
}

impl RecoveryServicer {
    /// Build a recovery servicer over the same backends a
    /// [`crate::manager::TransactionManager`] uses.
    pub fn new(
        registry: Arc<dyn Registry>,
        blobs: Arc<dyn BlobStore>,
        cache: Arc<dyn Cache>,
        tx_log: Arc<TransactionLog>,
        priority_log: Arc<PriorityLog>,
    ) -> Self {
        Self {
            registry,
            blobs,
            cache,
            tx_log,
            priority_log,
        }
    }

    /// Run one sweep. Returns the number of transactions resolved.
    ///
    /// First checks for an L2 cache restart (see
    /// [`RecoveryServicer::resolve_after_cache_restart`]); then claims and
    /// resolves up to `limit` transactions whose oldest logged step is more
    /// than an hour old, one OOA-locked claim per transaction (spec §4.9) so
    /// two sweepers never race to resolve — and blob-clean — the same one.
    pub fn sweep(&self, limit: usize) -> Result<usize> {
        let mut resolved = self.resolve_after_cache_restart()?;
        let now = now_ms();
        for (tid, swaps) in self.priority_log.get_batch(limit, now)? {
            if self.claim_and_resolve(tid, &swaps)? {
                resolved += 1;
            }
        }
        Ok(resolved)
    }

    /// If the L2 cache has no record of ever having run a sweep (either
    /// this is the very first startup, or the cache process restarted and
    /// lost every key it held), every currently logged transaction is
    /// resolved immediately regardless of age — the normal one-hour bucket
    /// gate assumes the cache has been continuously available, which no
    /// longer holds.
    fn resolve_after_cache_restart(&self) -> Result<usize> {
        if self.cache.get(RESTART_MARKER_KEY)?.is_some() {
            return Ok(0);
        }
        let mut resolved = 0;
        for (tid, swaps) in self.priority_log.get_batch(usize::MAX, i64::MAX)? {
            if self.claim_and_resolve(tid, &swaps)? {
                resolved += 1;
            }
        }
        self.cache.set(RESTART_MARKER_KEY, b"1", RESTART_MARKER_TTL)?;
        Ok(resolved)
    }

    /// Claim `tid` with an OOA lock before resolving it; skip it (returning
    /// `false`) if another sweeper already holds the claim.
    fn claim_and_resolve(&self, tid: Uuid, swaps: &[PendingSwap]) -> Result<bool> {
        let key = claim_key(tid);
        let (locked, _) = self.cache.dual_lock(CLAIM_LOCK_TTL, std::slice::from_ref(&key))?;
        if !locked {
            return Ok(false);
        }
        let result = self.resolve(tid, swaps);
        self.cache.unlock(std::slice::from_ref(&key)).ok();
        result?;
        Ok(true)
    }

    /// Decide, for each pending swap, whether the crash happened before or
    /// after the registry swap, and clean up whichever blob lost: the
    /// orphaned Phase 1 blob on rollback, or the superseded (or, for a
    /// tombstoned delete, now-dead) blob on roll-forward. Idempotent: a
    /// blob already removed by an earlier sweep or by the transaction's own
    /// success path is simply not found again (spec §4.5/§8).
    fn resolve(&self, tid: Uuid, swaps: &[PendingSwap]) -> Result<()> {
        for swap in swaps {
            match self.registry.get(swap.expected.logical_id, None)? {
                Some(current) if current.is_equal(&swap.new) => {
                    // Roll forward: phase 2 committed before the crash. The
                    // blob that lost is whatever became inactive, or — for
                    // a tombstoned delete, which never flips a slot — the
                    // node's own now-dead blob.
                    let dead = if swap.new.is_deleted {
                        swap.new.active_physical_id()
                    } else {
                        swap.new.inactive_physical_id()
                    };
                    self.blobs.remove(&swap.blob_table, dead)?;
                }
                Some(current) if current.is_equal(&swap.expected) => {
                    // Rollback: the registry write never happened. Anything
                    // staged into the inactive slot during phase 1 is
                    // orphaned; a delete never stages a new blob, so there
                    // is nothing to free in that case.
                    if !swap.new.is_deleted {
                        let orphan = swap.new.active_physical_id();
                        if orphan != swap.expected.active_physical_id() {
                            self.blobs.remove(&swap.blob_table, orphan)?;
                        }
                    }
                }
                _ => {
                    // A later transaction already moved this logical id;
                    // this stale entry is simply forgotten.
                }
            }
        }
        self.priority_log.remove(tid);
        self.tx_log.remove(tid);
        Ok(())
    }
}
