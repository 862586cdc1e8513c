//! Shared append-only, hourly-bucketed log primitive used by both the
//! transaction log and the priority log.

use dashmap::DashMap;
use sop_core::error::Result;
use uuid::Uuid;

/// One logged step for a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// The transaction this step belongs to.
    pub tid: Uuid,
    /// Step number within the transaction, used for idempotent re-adds: a
    /// retried `add` for a `(tid, step)` pair already on file is a no-op.
    pub step: u32,
    /// Opaque payload, typically JSON-serialized via the configured
    /// `Marshaler`.
    pub payload: Vec<u8>,
    /// Milliseconds-since-epoch when this step was logged, used to bucket
    /// entries by hour for sweeping.
    pub written_at_ms: i64,
}

fn hour_bucket(written_at_ms: i64) -> i64 {
    written_at_ms / (60 * 60 * 1000)
}

struct TxRecord {
    steps: Vec<LogEntry>,
    backup: Option<Vec<u8>>,
}

/// An append-only, `(tid, step)`-keyed log with hourly bucketing.
///
/// `enabled` mirrors `IsEnabled()`: a disabled log accepts no writes and
/// answers every read as empty, letting a deployment turn off recovery
/// logging entirely (e.g. for `NoCheck`-mode bulk loads) without special-
/// casing call sites.
pub struct LogStore {
    enabled: bool,
    records: DashMap<Uuid, TxRecord>,
}

impl LogStore {
    /// Build a log store. `enabled` mirrors `IsEnabled()`.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            records: DashMap::new(),
        }
    }

    /// `true` if this log accepts writes.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Append a step. Idempotent: re-adding the same `(tid, step)` is a
    /// no-op rather than a duplicate entry, so a retried phase-1 write
    /// after a transient failure doesn't corrupt the log.
    pub fn add(&self, tid: Uuid, step: u32, payload: Vec<u8>, now_ms: i64) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let mut rec = self.records.entry(tid).or_insert_with(|| TxRecord {
            steps: Vec::new(),
            backup: None,
        });
        if !rec.steps.iter().any(|s| s.step == step) {
            rec.steps.push(LogEntry {
                tid,
                step,
                payload,
                written_at_ms: now_ms,
            });
        }
        Ok(())
    }

    /// All logged steps for `tid`, in the order they were added.
    pub fn get(&self, tid: Uuid) -> Vec<LogEntry> {
        self.records.get(&tid).map(|r| r.steps.clone()).unwrap_or_default()
    }

    /// Drop every step for `tid`. Called once a transaction's outcome
    /// (commit or rollback) is durably known.
    pub fn remove(&self, tid: Uuid) {
        self.records.remove(&tid);
    }

    /// Stash a backup payload for `tid` (e.g. a pre-update `StoreInfo`
    /// snapshot, so a mid-sequence multi-store update failure can be
    /// undone — spec §4.4).
    pub fn write_backup(&self, tid: Uuid, payload: Vec<u8>) {
        let mut rec = self.records.entry(tid).or_insert_with(|| TxRecord {
            steps: Vec::new(),
            backup: None,
        });
        rec.backup = Some(payload);
    }

    /// Fetch the backup payload for `tid`, if any.
    pub fn read_backup(&self, tid: Uuid) -> Option<Vec<u8>> {
        self.records.get(&tid).and_then(|r| r.backup.clone())
    }

    /// Drop the backup payload for `tid`.
    pub fn remove_backup(&self, tid: Uuid) {
        if let Some(mut rec) = self.records.get_mut(&tid) {
            rec.backup = None;
        }
    }

    /// Up to `limit` transactions whose oldest logged step is more than one
    /// hour old, paired with their full step list. Deliberately excludes
    /// anything newer so the recovery sweeper never disturbs an in-flight
    /// commit that simply hasn't finished yet.
    pub fn get_batch(&self, limit: usize, now_ms: i64) -> Vec<(Uuid, Vec<LogEntry>)> {
        let current_bucket = hour_bucket(now_ms);
        let mut out = Vec::new();
        for entry in self.records.iter() {
            let tid = *entry.key();
            let oldest = entry.value().steps.iter().map(|s| s.written_at_ms).min();
            if let Some(oldest) = oldest {
                if current_bucket - hour_bucket(oldest) >= 1 {
                    out.push((tid, entry.value().steps.clone()));
                    if out.len() >= limit {
                        break;
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR_MS: i64 = 60 * 60 * 1000;

    #[test]
    fn disabled_log_accepts_no_writes() {
        let log = LogStore::new(false);
        log.add(Uuid::new_v4(), 0, vec![1], 0).unwrap();
        assert!(!log.is_enabled());
    }

    #[test]
    fn add_then_get_round_trips_in_order() {
        let log = LogStore::new(true);
        let tid = Uuid::new_v4();
        log.add(tid, 0, b"step0".to_vec(), 0).unwrap();
        log.add(tid, 1, b"step1".to_vec(), 0).unwrap();
        let steps = log.get(tid);
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].payload, b"step0");
        assert_eq!(steps[1].payload, b"step1");
    }

    #[test]
    fn re_adding_same_step_is_idempotent() {
        let log = LogStore::new(true);
        let tid = Uuid::new_v4();
        log.add(tid, 0, b"a".to_vec(), 0).unwrap();
        log.add(tid, 0, b"a-retry".to_vec(), 0).unwrap();
        assert_eq!(log.get(tid).len(), 1);
    }

    #[test]
    fn remove_clears_all_steps() {
        let log = LogStore::new(true);
        let tid = Uuid::new_v4();
        log.add(tid, 0, vec![], 0).unwrap();
        log.remove(tid);
        assert!(log.get(tid).is_empty());
    }

    #[test]
    fn backup_round_trips_and_clears() {
        let log = LogStore::new(true);
        let tid = Uuid::new_v4();
        log.write_backup(tid, b"snapshot".to_vec());
        assert_eq!(log.read_backup(tid), Some(b"snapshot".to_vec()));
        log.remove_backup(tid);
        assert_eq!(log.read_backup(tid), None);
    }

    #[test]
    fn get_batch_excludes_transactions_younger_than_one_hour() {
        let log = LogStore::new(true);
        let recent = Uuid::new_v4();
        log.add(recent, 0, vec![], 10 * HOUR_MS).unwrap();
        let batch = log.get_batch(10, 10 * HOUR_MS + 1);
        assert!(batch.is_empty());
    }

    #[test]
    fn get_batch_includes_transactions_older_than_one_hour() {
        let log = LogStore::new(true);
        let old = Uuid::new_v4();
        log.add(old, 0, vec![], 5 * HOUR_MS).unwrap();
        let batch = log.get_batch(10, 10 * HOUR_MS);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].0, old);
    }

    #[test]
    fn get_batch_respects_limit() {
        let log = LogStore::new(true);
        for _ in 0..5 {
            log.add(Uuid::new_v4(), 0, vec![], 0).unwrap();
        }
        let batch = log.get_batch(2, 10 * HOUR_MS);
        assert_eq!(batch.len(), 2);
    }
}
