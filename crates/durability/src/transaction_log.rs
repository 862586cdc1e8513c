//! The full per-transaction log: every phase-1 step, durable before phase 2
//! may begin (spec §4.7, §4.8).

use crate::log::{LogEntry, LogStore};
use serde::{Deserialize, Serialize};
use sop_core::error::Result;
use uuid::Uuid;

/// One phase-1 step recorded for crash recovery. Encoded via `rmp-serde`
/// (a single byte-oriented payload schema, resolving spec Open Question (b)
/// in favor of one format rather than the two near-identical schemas the
/// distillation carried forward).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TxStep {
    /// A new blob was written into the inactive slot of `logical_id`'s
    /// handle.
    BlobStaged {
        /// Store the resource belongs to.
        store: String,
        /// Logical id whose inactive slot received the new blob.
        logical_id: Uuid,
        /// The physical id just written.
        physical_id: Uuid,
    },
    /// An OOA lock was acquired for `resource`.
    LockAcquired {
        /// Resource name the lock covers.
        resource: String,
    },
    /// Phase-1 version recheck A passed for every touched resource.
    RecheckAPassed,
    /// Phase-2 version recheck B passed for every touched resource.
    RecheckBPassed,
    /// The registry swap (the commit point) has been applied for
    /// `logical_id`, moving it to `new_version`.
    RegistrySwapped {
        /// Logical id whose handle was swapped.
        logical_id: Uuid,
        /// The handle's version after the swap.
        new_version: u32,
    },
}

/// Durable, per-transaction record of in-flight commit steps.
pub struct TransactionLog {
    store: LogStore,
}

impl TransactionLog {
    /// Build a transaction log. `enabled` mirrors `IsEnabled()` — a
    /// deployment may disable recovery logging entirely for bulk loads
    /// under `NoCheck` mode.
    pub fn new(enabled: bool) -> Self {
        Self {
            store: LogStore::new(enabled),
        }
    }

    /// `true` if this log accepts writes.
    pub fn is_enabled(&self) -> bool {
        self.store.is_enabled()
    }

    /// Append one step. Idempotent per `(tid, step)`.
    pub fn add(&self, tid: Uuid, step: u32, payload: &TxStep, now_ms: i64) -> Result<()> {
        let bytes = rmp_serde::to_vec(payload)?;
        self.store.add(tid, step, bytes, now_ms)
    }

    /// All decoded steps logged for `tid`, in order.
    pub fn get(&self, tid: Uuid) -> Result<Vec<TxStep>> {
        self.decode_all(self.store.get(tid))
    }

    /// Drop every step for `tid` — called once the transaction's outcome is
    /// durably known.
    pub fn remove(&self, tid: Uuid) {
        self.store.remove(tid)
    }

    /// Up to `limit` transactions whose oldest logged step is more than one
    /// hour old, decoded.
    pub fn get_batch(&self, limit: usize, now_ms: i64) -> Result<Vec<(Uuid, Vec<TxStep>)>> {
        self.store
            .get_batch(limit, now_ms)
            .into_iter()
            .map(|(tid, entries)| Ok((tid, self.decode_all(entries)?)))
            .collect()
    }

    fn decode_all(&self, entries: Vec<LogEntry>) -> Result<Vec<TxStep>> {
        entries
            .into_iter()
            .map(|e| Ok(rmp_serde::from_slice(&e.payload)?))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_staged_step_round_trips() {
        let log = TransactionLog::new(true);
        let tid = Uuid::new_v4();
        let step = TxStep::BlobStaged {
            store: "orders".into(),
            logical_id: Uuid::new_v4(),
            physical_id: Uuid::new_v4(),
        };
        log.add(tid, 0, &step, 0).unwrap();
        assert_eq!(log.get(tid).unwrap(), vec![step]);
    }

    #[test]
    fn steps_decode_in_append_order() {
        let log = TransactionLog::new(true);
        let tid = Uuid::new_v4();
        log.add(tid, 0, &TxStep::RecheckAPassed, 0).unwrap();
        log.add(tid, 1, &TxStep::RecheckBPassed, 0).unwrap();
        let steps = log.get(tid).unwrap();
        assert_eq!(steps, vec![TxStep::RecheckAPassed, TxStep::RecheckBPassed]);
    }

    #[test]
    fn remove_clears_the_log_for_a_transaction() {
        let log = TransactionLog::new(true);
        let tid = Uuid::new_v4();
        log.add(tid, 0, &TxStep::RecheckAPassed, 0).unwrap();
        log.remove(tid);
        assert!(log.get(tid).unwrap().is_empty());
    }
}
