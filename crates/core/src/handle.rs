//! The logical → physical indirection at the heart of commit.
//!
//! A [`Handle`] is the only thing the [`crate::traits::Registry`] stores for
//! a given logical id. It names two physical slots, `A` and `B`; exactly one
//! is active at any time. A transaction that wants to change the node or
//! value a logical id refers to writes the new blob into the *inactive*
//! slot during phase 1 and only flips which slot is active during phase 2 —
//! the flip is the commit point. This is the "pheromone" indirection: the
//! Registry entry is tiny and globally synchronized, while the heavy blob it
//! points to is cached locally by physical id and never needs coordinated
//! invalidation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Logical → physical indirection record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handle {
    /// The stable, externally-visible id. Never changes for the lifetime of
    /// the resource it names.
    pub logical_id: Uuid,
    /// Physical id of slot A.
    pub physical_id_a: Uuid,
    /// Physical id of slot B.
    pub physical_id_b: Uuid,
    /// `true` when slot B is the currently active slot; `false` for slot A.
    pub is_active_id_b: bool,
    /// Monotonically increasing version. Incremented exactly once per
    /// successful commit that swaps the active slot.
    pub version: u32,
    /// Milliseconds-since-epoch timestamp set when a transaction starts
    /// writing to the inactive slot, and cleared when the transaction
    /// commits or rolls back. A nonzero value surviving past a commit's
    /// `CommitMaxDuration` is the recovery servicer's signal that this
    /// handle belongs to an in-flight or crashed transaction.
    pub work_in_progress_timestamp: i64,
    /// Tombstone. A deleted handle is retained (not physically removed) so
    /// that the recovery and cleanup machinery can still find it.
    pub is_deleted: bool,
}

impl Handle {
    /// Create a brand-new handle for `logical_id`, with both physical slots
    /// set to `initial_physical_id` and slot A active. Used for the very
    /// first version of a resource, where there is no "previous" blob to
    /// keep inactive.
    pub fn new(logical_id: Uuid, initial_physical_id: Uuid) -> Self {
        Self {
            logical_id,
            physical_id_a: initial_physical_id,
            physical_id_b: initial_physical_id,
            is_active_id_b: false,
            version: 0,
            work_in_progress_timestamp: 0,
            is_deleted: false,
        }
    }

    /// The physical id currently considered live.
    pub fn active_physical_id(&self) -> Uuid {
        if self.is_active_id_b {
            self.physical_id_b
        } else {
            self.physical_id_a
        }
    }

    /// The physical id of the inactive slot, i.e. where a phase-1 write for
    /// the next version belongs.
    pub fn inactive_physical_id(&self) -> Uuid {
        if self.is_active_id_b {
            self.physical_id_a
        } else {
            self.physical_id_b
        }
    }

    /// Stage a new physical blob id into the inactive slot and mark this
    /// handle as having work in progress. Does not flip which slot is
    /// active — that only happens in [`Handle::commit`].
    pub fn stage(&mut self, new_physical_id: Uuid, now_ms: i64) {
        if self.is_active_id_b {
            self.physical_id_a = new_physical_id;
        } else {
            self.physical_id_b = new_physical_id;
        }
        self.work_in_progress_timestamp = now_ms;
    }

    /// Phase-2 commit point: flip the active slot to the one staged by
    /// [`Handle::stage`], bump the version, and clear the in-progress
    /// marker.
    pub fn commit(&mut self) {
        self.is_active_id_b = !self.is_active_id_b;
        self.version += 1;
        self.work_in_progress_timestamp = 0;
    }

    /// Undo an in-progress stage without flipping the active slot. Used by
    /// rollback: the inactive slot still names a blob, but nothing refers
    /// to it as the active version, so it's safe for cleanup to collect.
    pub fn clear_work_in_progress(&mut self) {
        self.work_in_progress_timestamp = 0;
    }

    /// `true` when a transaction appears to be mid-commit against this
    /// handle (nonzero work-in-progress timestamp).
    pub fn has_work_in_progress(&self) -> bool {
        self.work_in_progress_timestamp != 0
    }

    /// The two-points-in-time recheck condition used by phase 1 recheck A
    /// and phase 2 recheck B: the handle observed at read time must still
    /// match the handle currently in the registry, exactly.
    pub fn is_equal(&self, other: &Handle) -> bool {
        self == other
    }
}
