//! A single key/value entry stored in a B-Tree leaf slot.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where an item's value physically lives.
///
/// Small stores keep the value inline in the node segment
/// (`IsValueDataInNodeSegment`); medium/big stores keep it in a separate
/// value blob addressed by the item's id and fetch it lazily.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemValue {
    /// Value bytes stored directly alongside the key in the node segment.
    Inline(Vec<u8>),
    /// Value stored out-of-line; fetched on demand via the item id.
    OutOfLine,
}

/// One key/value entry. `key` and the inline value (when present) are
/// opaque serialized bytes — the B-Tree engine itself never deserializes
/// them, it only asks a [`crate::compare::Comparer`] to order them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Stable identity for this item, independent of the node/slot it
    /// currently occupies. Out-of-line value blobs are keyed by this id.
    pub id: Uuid,
    /// Serialized key bytes, ordered by the store's [`crate::compare::Comparer`].
    pub key: Vec<u8>,
    /// The value, inline or a marker that it must be fetched separately.
    pub value: ItemValue,
    /// Version independent of any [`crate::handle::Handle`] version — bumped
    /// on every successful `update`/`upsert` of this item's value.
    pub version: u32,
}

impl Item {
    /// Construct a new item with an inline value.
    pub fn new_inline(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            value: ItemValue::Inline(value),
            version: 0,
        }
    }

    /// Construct a new item whose value is stored out-of-line.
    pub fn new_out_of_line(key: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            value: ItemValue::OutOfLine,
            version: 0,
        }
    }

    /// `true` if this item's value must be fetched from a separate blob
    /// before it can be returned to the caller.
    pub fn value_needs_fetch(&self) -> bool {
        matches!(self.value, ItemValue::OutOfLine)
    }

    /// Replace the inline value and bump the item's version. Panics if
    /// called on an out-of-line item — callers must write the new value
    /// blob instead (see `NodeRepository::update`).
    pub fn set_inline_value(&mut self, value: Vec<u8>) {
        debug_assert!(
            matches!(self.value, ItemValue::Inline(_)),
            "set_inline_value called on an out-of-line item"
        );
        self.value = ItemValue::Inline(value);
        self.version += 1;
    }

    /// Bump the item's version without touching the stored bytes. Used when
    /// the value lives out-of-line and only the blob (not this struct)
    /// changes.
    pub fn bump_version(&mut self) {
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_item_reports_no_fetch_needed() {
        let item = Item::new_inline(b"k".to_vec(), b"v".to_vec());
        assert!(!item.value_needs_fetch());
    }

    #[test]
    fn out_of_line_item_reports_fetch_needed() {
        let item = Item::new_out_of_line(b"k".to_vec());
        assert!(item.value_needs_fetch());
    }

    #[test]
    fn set_inline_value_bumps_version() {
        let mut item = Item::new_inline(b"k".to_vec(), b"v1".to_vec());
        assert_eq!(item.version, 0);
        item.set_inline_value(b"v2".to_vec());
        assert_eq!(item.version, 1);
        assert_eq!(item.value, ItemValue::Inline(b"v2".to_vec()));
    }

    #[test]
    fn each_new_item_gets_a_distinct_id() {
        let a = Item::new_inline(b"k".to_vec(), b"v".to_vec());
        let b = Item::new_inline(b"k".to_vec(), b"v".to_vec());
        assert_ne!(a.id, b.id);
    }
}
