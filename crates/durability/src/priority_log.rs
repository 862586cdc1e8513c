//! The priority log: the minimum information the recovery servicer needs to
//! decide, for a crashed transaction, whether to roll it forward (finish an
//! already-decided registry swap) or roll it back (the swap never
//! happened) — spec §4.8, §4.9.

use crate::log::LogStore;
use serde::{Deserialize, Serialize};
use sop_core::error::Result;
use sop_core::handle::Handle;
use uuid::Uuid;

/// One handle this transaction intended to swap, and whether the swap was
/// confirmed applied. Recovery treats a transaction with any `applied:
/// false` entry as needing rollback; one where every entry is `applied:
/// true` is safe to roll forward (or is already complete).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingSwap {
    /// The handle as it was before this transaction (rollback target).
    pub expected: Handle,
    /// The handle this transaction wants in place after commit — already
    /// finalized (active slot flipped, version bumped) exactly as it will
    /// be written to the registry at the commit point, so recovery can
    /// compare it directly against what it finds there.
    pub new: Handle,
    /// Blob table this handle's physical ids are stored under, so recovery
    /// knows where to remove a superseded or orphaned blob.
    pub blob_table: String,
    /// Whether phase 2 confirmed this specific swap was applied.
    pub applied: bool,
}

/// Durable record of the in-flight registry swaps for a transaction,
/// narrower than the full [`crate::transaction_log::TransactionLog`] so the
/// recovery sweep can make its rollback/roll-forward decision cheaply.
pub struct PriorityLog {
    store: LogStore,
}

impl PriorityLog {
    /// Build a priority log. `enabled` mirrors `IsEnabled()`.
    pub fn new(enabled: bool) -> Self {
        Self {
            store: LogStore::new(enabled),
        }
    }

    /// `true` if this log accepts writes.
    pub fn is_enabled(&self) -> bool {
        self.store.is_enabled()
    }

    /// Record (or update) the pending-swap set for `tid` as a single
    /// logical step — re-adding under the same step number is idempotent,
    /// so callers always log the latest full set under step `0`.
    pub fn record(&self, tid: Uuid, swaps: &[PendingSwap], now_ms: i64) -> Result<()> {
        let bytes = rmp_serde::to_vec(swaps)?;
        self.store.remove(tid);
        self.store.add(tid, 0, bytes, now_ms)
    }

    /// Fetch the pending-swap set for `tid`, if logged.
    pub fn get(&self, tid: Uuid) -> Result<Vec<PendingSwap>> {
        match self.store.get(tid).into_iter().next() {
            Some(entry) => Ok(rmp_serde::from_slice(&entry.payload)?),
            None => Ok(Vec::new()),
        }
    }

    /// Clear the record for `tid`. Callers MUST only do this once the
    /// transaction is known committed (every swap applied) or rolled back
    /// (every swap undone) — never while a swap's fate is undetermined.
    pub fn remove(&self, tid: Uuid) {
        self.store.remove(tid)
    }

    /// Up to `limit` transactions whose oldest logged step is more than one
    /// hour old — these are the candidates the recovery servicer sweeps.
    pub fn get_batch(&self, limit: usize, now_ms: i64) -> Result<Vec<(Uuid, Vec<PendingSwap>)>> {
        self.store
            .get_batch(limit, now_ms)
            .into_iter()
            .map(|(tid, entries)| {
                let swaps = match entries.into_iter().next() {
                    Some(entry) => rmp_serde::from_slice(&entry.payload)?,
                    None => Vec::new(),
                };
                Ok((tid, swaps))
            })
            .collect()
    }
}
