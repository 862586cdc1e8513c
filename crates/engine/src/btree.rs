//! The persistent M-way B-Tree engine (spec §4.1).
//!
//! `BTreeEngine` is the only thing that interprets [`sop_core::node::Node`]
//! contents as a tree — it never talks to a [`sop_core::traits::BlobStore`]
//! or [`sop_core::traits::Registry`] directly, only through the
//! [`sop_core::traits::NodeRepository`] and
//! [`sop_core::traits::ItemActionTracker`] handed to it, which is what lets
//! the same engine run identically inside a transaction (working-set-backed
//! repository) or in read-only mode against a snapshot.
//!
//! Nodes keep their occupied slots left-packed and sorted (`slots[0..count]`
//! populated, the rest `None`) rather than allowing holes anywhere in the
//! array; this keeps insertion/removal/split/merge bookkeeping tractable
//! while still satisfying the spec's "deletion may underbalance and is
//! lazily repaired by subsequent inserts, never forced to rebalance
//! eagerly" requirement — underflow is only ever acted on on the delete
//! path itself, one level at a time, never cascaded.

use sop_core::compare::Comparer;
use sop_core::error::{Error, Result};
use sop_core::item::{Item, ItemValue};
use sop_core::node::Node;
use sop_core::store::{LeafLoadBalancing, StoreInfo};
use sop_core::traits::{ItemAction, ItemActionTracker, NodeRepository, TrackedItemAction};
use std::cmp::Ordering;
use uuid::Uuid;

/// The engine's single lazy cursor: the slot an enumeration or lookup last
/// landed on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    node_id: Option<Uuid>,
    slot_index: Option<usize>,
}

impl Cursor {
    fn none() -> Self {
        Self::default()
    }

    fn is_set(&self) -> bool {
        self.node_id.is_some() && self.slot_index.is_some()
    }
}

/// The B-Tree engine for one store, operating against a caller-supplied
/// [`NodeRepository`] and [`ItemActionTracker`] — typically the per-
/// transaction implementations from this crate, but any conforming
/// implementation works.
pub struct BTreeEngine<'a> {
    repo: &'a mut dyn NodeRepository,
    comparer: &'a dyn Comparer,
    store: &'a mut StoreInfo,
    tracker: &'a mut dyn ItemActionTracker,
    cursor: Cursor,
}

impl<'a> BTreeEngine<'a> {
    /// Build an engine for `store`, using `repo` for node access and
    /// `tracker` to record item-level actions for the transaction
    /// protocol's phase-1 recheck.
    pub fn new(
        repo: &'a mut dyn NodeRepository,
        comparer: &'a dyn Comparer,
        store: &'a mut StoreInfo,
        tracker: &'a mut dyn ItemActionTracker,
    ) -> Self {
        Self {
            repo,
            comparer,
            store,
            tracker,
            cursor: Cursor::none(),
        }
    }

    fn slot_length(&self) -> usize {
        self.store.slot_length as usize
    }

    fn underflow_threshold(&self) -> usize {
        Node::underflow_threshold(self.slot_length())
    }

    // ---- search -----------------------------------------------------

    /// Locate the leftmost item in a node's occupied prefix equal to
    /// `key`, or the insertion point.
    fn search_node(node: &Node, key: &[u8], comparer: &dyn Comparer) -> std::result::Result<usize, usize> {
        let n = node.count as usize;
        let mut lo = 0usize;
        let mut hi = n;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let mid_key = &node.slots[mid].as_ref().expect("compacted slots").key;
            match comparer.compare(mid_key, key) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Ok(mid),
            }
        }
        Err(lo)
    }

    /// Find the first item with `key`. Sets the cursor on success.
    pub fn find(&mut self, key: &[u8], _first_item_with_key: bool) -> Result<bool> {
        let Some(root_id) = self.store.root_node_id else {
            self.cursor = Cursor::none();
            return Ok(false);
        };

        let mut current_id = root_id;
        loop {
            let node = self.repo.get(current_id)?.ok_or(Error::NotFound)?;
            match Self::search_node(&node, key, self.comparer) {
                Ok(idx) => {
                    let item = node.slots[idx].as_ref().expect("compacted slots").clone();
                    self.cursor = Cursor {
                        node_id: Some(node.id),
                        slot_index: Some(idx),
                    };
                    self.tracker.record(TrackedItemAction {
                        item_id: item.id,
                        action: ItemAction::Get,
                        observed_version: item.version,
                        new_version_if_write: None,
                        key: item.key,
                    });
                    return Ok(true);
                }
                Err(pos) => {
                    if node.is_leaf() {
                        self.cursor = Cursor::none();
                        return Ok(false);
                    }
                    current_id = node.children_ids.get(pos).copied().flatten().ok_or(Error::NotFound)?;
                }
            }
        }
    }

    /// Find the item with `key` and `item_id` specifically, among possibly
    /// several items sharing `key` in a non-unique store.
    pub fn find_with_id(&mut self, key: &[u8], item_id: Uuid) -> Result<bool> {
        if !self.find(key, true)? {
            return Ok(false);
        }
        loop {
            match self.get_current_item()? {
                Some(item) if item.id == item_id => return Ok(true),
                Some(item) if self.comparer.compare(&item.key, key) == Ordering::Equal => {
                    if !self.next()? {
                        return Ok(false);
                    }
                }
                _ => return Ok(false),
            }
        }
    }

    // ---- cursor reads -------------------------------------------------

    /// The item at the current cursor position, if the cursor is set.
    pub fn get_current_item(&mut self) -> Result<Option<Item>> {
        let Cursor { node_id: Some(nid), slot_index: Some(idx) } = self.cursor else {
            return Ok(None);
        };
        let node = self.repo.get(nid)?.ok_or(Error::NotFound)?;
        Ok(node.slots.get(idx).and_then(|s| s.clone()))
    }

    /// The key at the current cursor position.
    pub fn get_current_key(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.get_current_item()?.map(|i| i.key))
    }

    /// The value at the current cursor position. Returns
    /// [`Error::Incompatible`] for out-of-line values — fetching those is
    /// the API facade's job (it alone holds a `BlobStore` handle for value
    /// blobs), not the engine's.
    pub fn get_current_value(&mut self) -> Result<Option<ItemValue>> {
        Ok(self.get_current_item()?.map(|i| i.value))
    }

    // ---- enumeration ----------------------------------------------------

    fn in_order_ids(&mut self) -> Result<Vec<(Uuid, Uuid)>> {
        let mut out = Vec::new();
        if let Some(root) = self.store.root_node_id {
            self.walk(root, &mut out)?;
        }
        Ok(out)
    }

    fn walk(&mut self, node_id: Uuid, out: &mut Vec<(Uuid, Uuid)>) -> Result<()> {
        let node = self.repo.get(node_id)?.ok_or(Error::NotFound)?;
        let count = node.count as usize;
        if node.is_leaf() {
            for i in 0..count {
                out.push((node.id, node.slots[i].as_ref().expect("compacted").id));
            }
            return Ok(());
        }
        for i in 0..=count {
            if let Some(child) = node.children_ids.get(i).copied().flatten() {
                self.walk(child, out)?;
            }
            if i < count {
                out.push((node.id, node.slots[i].as_ref().expect("compacted").id));
            }
        }
        Ok(())
    }

    fn set_cursor_from_item_id(&mut self, ordered: &[(Uuid, Uuid)], target_item: Uuid) -> Result<bool> {
        for (node_id, item_id) in ordered {
            if *item_id == target_item {
                let node = self.repo.get(*node_id)?.ok_or(Error::NotFound)?;
                let idx = (0..node.count as usize)
                    .find(|&i| node.slots[i].as_ref().map(|it| it.id) == Some(target_item))
                    .ok_or(Error::NotFound)?;
                self.cursor = Cursor {
                    node_id: Some(*node_id),
                    slot_index: Some(idx),
                };
                return Ok(true);
            }
        }
        self.cursor = Cursor::none();
        Ok(false)
    }

    /// Move the cursor to the first item in key order.
    pub fn first(&mut self) -> Result<bool> {
        let ordered = self.in_order_ids()?;
        match ordered.first() {
            Some((node_id, item_id)) => {
                self.cursor = Cursor {
                    node_id: Some(*node_id),
                    slot_index: self.slot_index_of(*node_id, *item_id)?,
                };
                Ok(true)
            }
            None => {
                self.cursor = Cursor::none();
                Ok(false)
            }
        }
    }

    /// Move the cursor to the last item in key order.
    pub fn last(&mut self) -> Result<bool> {
        let ordered = self.in_order_ids()?;
        match ordered.last() {
            Some((node_id, item_id)) => {
                self.cursor = Cursor {
                    node_id: Some(*node_id),
                    slot_index: self.slot_index_of(*node_id, *item_id)?,
                };
                Ok(true)
            }
            None => {
                self.cursor = Cursor::none();
                Ok(false)
            }
        }
    }

    fn slot_index_of(&mut self, node_id: Uuid, item_id: Uuid) -> Result<Option<usize>> {
        let node = self.repo.get(node_id)?.ok_or(Error::NotFound)?;
        Ok((0..node.count as usize).find(|&i| node.slots[i].as_ref().map(|it| it.id) == Some(item_id)))
    }

    /// Advance the cursor by one item in key order.
    pub fn next(&mut self) -> Result<bool> {
        if !self.cursor.is_set() {
            return self.first();
        }
        let current_item = self.get_current_item()?.map(|i| i.id);
        let ordered = self.in_order_ids()?;
        let Some(current) = current_item else {
            return self.first();
        };
        let pos = ordered.iter().position(|(_, id)| *id == current);
        match pos.and_then(|p| ordered.get(p + 1)) {
            Some((node_id, item_id)) => {
                self.cursor = Cursor {
                    node_id: Some(*node_id),
                    slot_index: self.slot_index_of(*node_id, *item_id)?,
                };
                Ok(true)
            }
            None => {
                self.cursor = Cursor::none();
                Ok(false)
            }
        }
    }

    /// Move the cursor back by one item in key order.
    pub fn previous(&mut self) -> Result<bool> {
        if !self.cursor.is_set() {
            return self.last();
        }
        let current_item = self.get_current_item()?.map(|i| i.id);
        let ordered = self.in_order_ids()?;
        let Some(current) = current_item else {
            return self.last();
        };
        let pos = ordered.iter().position(|(_, id)| *id == current);
        match pos.and_then(|p| p.checked_sub(1)).and_then(|p| ordered.get(p)) {
            Some((node_id, item_id)) => {
                self.cursor = Cursor {
                    node_id: Some(*node_id),
                    slot_index: self.slot_index_of(*node_id, *item_id)?,
                };
                Ok(true)
            }
            None => {
                self.cursor = Cursor::none();
                Ok(false)
            }
        }
    }

    /// Number of items reachable from the root, per the store's persisted
    /// + in-flight count (not a tree walk — see [`StoreInfo::effective_count`]).
    pub fn count(&self) -> i64 {
        self.store.effective_count()
    }

    /// Whether this store is configured unique.
    pub fn is_unique(&self) -> bool {
        self.store.is_unique
    }

    /// The engine's current cursor, for a caller that needs to preserve
    /// enumeration position across separate `BTreeEngine` borrows (e.g. a
    /// transaction facade that rebuilds the engine on every call).
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Restore a previously saved cursor.
    pub fn set_cursor(&mut self, cursor: Cursor) {
        self.cursor = cursor;
    }

    // ---- mutation -------------------------------------------------------

    /// Insert `key`/`value`. Fails with [`Error::DuplicateKey`] if the
    /// store is unique and `key` already exists.
    pub fn add(&mut self, key: Vec<u8>, value: ItemValue) -> Result<Uuid> {
        if self.store.is_unique && self.find(&key, true)? {
            return Err(Error::DuplicateKey);
        }
        self.insert_item(Item {
            id: Uuid::new_v4(),
            key,
            value,
            version: 0,
        })
    }

    /// Insert `key`/`value` only if `key` doesn't already exist. Returns
    /// `false` (without inserting) if it does.
    pub fn add_if_not_exist(&mut self, key: Vec<u8>, value: ItemValue) -> Result<bool> {
        if self.find(&key, true)? {
            return Ok(false);
        }
        self.insert_item(Item {
            id: Uuid::new_v4(),
            key,
            value,
            version: 0,
        })?;
        Ok(true)
    }

    /// Update the value of `key` (the first match). Fails with
    /// [`Error::NotFound`] if absent.
    pub fn update(&mut self, key: &[u8], value: ItemValue) -> Result<()> {
        if !self.find(key, true)? {
            return Err(Error::NotFound);
        }
        self.update_current(value)
    }

    /// `find(key) ? update(key, value) : add(key, value)`.
    pub fn upsert(&mut self, key: Vec<u8>, value: ItemValue) -> Result<()> {
        if self.find(&key, true)? {
            self.update_current(value)
        } else {
            self.insert_item(Item {
                id: Uuid::new_v4(),
                key,
                value,
                version: 0,
            })
            .map(|_| ())
        }
    }

    /// Update the value at the current cursor position.
    pub fn update_current(&mut self, value: ItemValue) -> Result<()> {
        let Cursor { node_id: Some(nid), slot_index: Some(idx) } = self.cursor else {
            return Err(Error::NotFound);
        };
        let mut node = self.repo.get(nid)?.ok_or(Error::NotFound)?;
        let item = node.slots[idx].as_mut().ok_or(Error::NotFound)?;
        let observed_version = item.version;
        item.value = value;
        item.version += 1;
        let (item_id, new_version, key) = (item.id, item.version, item.key.clone());
        node.version += 1;
        self.repo.update(node)?;
        self.tracker.record(TrackedItemAction {
            item_id,
            action: ItemAction::Update,
            observed_version,
            new_version_if_write: Some(new_version),
            key,
        });
        Ok(())
    }

    /// Remove `key` (the first match). Fails with [`Error::NotFound`] if
    /// absent.
    pub fn remove(&mut self, key: &[u8]) -> Result<()> {
        if !self.find(key, true)? {
            return Err(Error::NotFound);
        }
        self.remove_current()
    }

    /// Remove the item at the current cursor position.
    pub fn remove_current(&mut self) -> Result<()> {
        let Cursor { node_id: Some(nid), slot_index: Some(idx) } = self.cursor else {
            return Err(Error::NotFound);
        };
        let node = self.repo.get(nid)?.ok_or(Error::NotFound)?;
        let removed = node.slots[idx].clone().ok_or(Error::NotFound)?;

        if node.is_leaf() {
            self.remove_from_leaf(node, idx)?;
        } else {
            let left_child = node.children_ids[idx].ok_or(Error::NotFound)?;
            let (pred_item, pred_leaf_id, pred_slot_idx) = self.find_rightmost(left_child)?;
            let mut node = node;
            node.slots[idx] = Some(pred_item);
            node.version += 1;
            self.repo.update(node)?;
            let pred_leaf = self.repo.get(pred_leaf_id)?.ok_or(Error::NotFound)?;
            self.remove_from_leaf(pred_leaf, pred_slot_idx)?;
        }

        self.store.count_delta -= 1;
        self.cursor = Cursor::none();
        self.tracker.record(TrackedItemAction {
            item_id: removed.id,
            action: ItemAction::Remove,
            observed_version: removed.version,
            new_version_if_write: None,
            key: removed.key,
        });
        Ok(())
    }

    fn find_rightmost(&mut self, mut node_id: Uuid) -> Result<(Item, Uuid, usize)> {
        loop {
            let node = self.repo.get(node_id)?.ok_or(Error::NotFound)?;
            if node.is_leaf() {
                let idx = node.count as usize - 1;
                return Ok((node.slots[idx].clone().ok_or(Error::NotFound)?, node.id, idx));
            }
            node_id = node.children_ids[node.count as usize].ok_or(Error::NotFound)?;
        }
    }

    fn remove_from_leaf(&mut self, mut leaf: Node, idx: usize) -> Result<()> {
        node_remove_at(&mut leaf, idx);
        leaf.version += 1;

        let Some(parent_id) = leaf.parent_id else {
            // Root: no minimum-occupancy rule applies.
            self.repo.update(leaf)?;
            return Ok(());
        };
        if (leaf.count as usize) >= self.underflow_threshold() {
            self.repo.update(leaf)?;
            return Ok(());
        }
        self.repair_underflow(leaf, parent_id)
    }

    /// Borrow-or-merge repair for one underflowing node, against its
    /// immediate siblings only — per spec, underflow repair is deliberately
    /// not cascaded further up the tree; any resulting parent-level
    /// thinness is left for a later insert to repair.
    fn repair_underflow(&mut self, mut node: Node, parent_id: Uuid) -> Result<()> {
        let mut parent = self.repo.get(parent_id)?.ok_or(Error::NotFound)?;
        let idx = parent
            .children_ids
            .iter()
            .position(|c| *c == Some(node.id))
            .ok_or(Error::NotFound)?;
        let threshold = self.underflow_threshold();

        if idx < parent.count as usize {
            let right_id = parent.children_ids[idx + 1].ok_or(Error::NotFound)?;
            let mut right = self.repo.get(right_id)?.ok_or(Error::NotFound)?;
            if (right.count as usize) > threshold {
                let right_child_count = right.count as usize + 1;
                let separator = parent.slots[idx].clone().ok_or(Error::NotFound)?;
                let moved_up = node_remove_at(&mut right, 0);
                let insert_pos = node.count as usize;
                node_insert_at(&mut node, insert_pos, separator);
                parent.slots[idx] = Some(moved_up);
                if !node.is_leaf() {
                    let moved_child = children_remove_at(&mut right, 0, right_child_count);
                    node.children_ids[insert_pos + 1] = moved_child;
                }
                node.version += 1;
                right.version += 1;
                parent.version += 1;
                self.repo.update(node)?;
                self.repo.update(right)?;
                self.repo.update(parent)?;
                return Ok(());
            }
        }

        if idx > 0 {
            let left_id = parent.children_ids[idx - 1].ok_or(Error::NotFound)?;
            let mut left = self.repo.get(left_id)?.ok_or(Error::NotFound)?;
            if (left.count as usize) > threshold {
                let old_child_count = node.count as usize + 1;
                let left_child_count = left.count as usize + 1;
                let separator = parent.slots[idx - 1].clone().ok_or(Error::NotFound)?;
                let borrowed = node_remove_at(&mut left, left.count as usize - 1);
                node_insert_at(&mut node, 0, separator);
                parent.slots[idx - 1] = Some(borrowed);
                if !node.is_leaf() {
                    let moved_child = children_remove_at(&mut left, left_child_count - 1, left_child_count);
                    for i in (0..old_child_count).rev() {
                        node.children_ids[i + 1] = node.children_ids[i].take();
                    }
                    node.children_ids[0] = moved_child;
                }
                node.version += 1;
                left.version += 1;
                parent.version += 1;
                self.repo.update(node)?;
                self.repo.update(left)?;
                self.repo.update(parent)?;
                return Ok(());
            }
        }

        if idx < parent.count as usize {
            let right_id = parent.children_ids[idx + 1].ok_or(Error::NotFound)?;
            let right = self.repo.get(right_id)?.ok_or(Error::NotFound)?;
            self.merge_nodes(parent, idx, node, right)
        } else {
            let left_id = parent.children_ids[idx - 1].ok_or(Error::NotFound)?;
            let left = self.repo.get(left_id)?.ok_or(Error::NotFound)?;
            self.merge_nodes(parent, idx - 1, left, node)
        }
    }

    fn merge_nodes(&mut self, mut parent: Node, sep_idx: usize, mut left: Node, right: Node) -> Result<()> {
        let separator = parent.slots[sep_idx].clone().ok_or(Error::NotFound)?;
        let base = left.count as usize;
        left.slots[base] = Some(separator);
        for i in 0..(right.count as usize) {
            left.slots[base + 1 + i] = right.slots[i].clone();
        }
        left.count = base as u16 + 1 + right.count;
        if !left.is_leaf() {
            let base_children = base + 1;
            for i in 0..=(right.count as usize) {
                left.children_ids[base_children + i] = right.children_ids[i];
            }
        }
        left.version += 1;

        let old_children_count = parent.count as usize + 1;
        node_remove_at(&mut parent, sep_idx);
        for i in (sep_idx + 1)..(old_children_count - 1) {
            parent.children_ids[i] = parent.children_ids[i + 1].take();
        }
        parent.children_ids[old_children_count - 1] = None;
        parent.version += 1;

        self.repo.update(left.clone())?;
        self.repo.remove(right.id)?;

        if parent.parent_id.is_none() && parent.count == 0 {
            let mut new_root = left;
            new_root.parent_id = None;
            self.repo.update(new_root.clone())?;
            self.repo.remove(parent.id)?;
            self.store.root_node_id = Some(new_root.id);
        } else {
            left.parent_id = Some(parent.id);
            self.repo.update(parent)?;
        }
        Ok(())
    }

    fn insert_item(&mut self, item: Item) -> Result<Uuid> {
        let slot_length = self.slot_length();
        let item_id = item.id;

        let Some(root_id) = self.store.root_node_id else {
            let mut leaf = Node::new_leaf(slot_length);
            node_insert_at(&mut leaf, 0, item);
            self.store.root_node_id = Some(leaf.id);
            self.repo.commit_new_root(leaf)?;
            self.store.count_delta += 1;
            self.track_added(item_id, 0, vec![]);
            return Ok(item_id);
        };

        let mut root = self.repo.get(root_id)?.ok_or(Error::NotFound)?;
        if root.count as usize == slot_length {
            let (promoted, mut right) = self.split_node(&mut root, slot_length);
            let mut new_root = Node::new_inner(slot_length);
            node_insert_at(&mut new_root, 0, promoted);
            root.parent_id = Some(new_root.id);
            right.parent_id = Some(new_root.id);
            new_root.children_ids[0] = Some(root.id);
            new_root.children_ids[1] = Some(right.id);
            self.repo.update(root)?;
            self.repo.put_new(right)?;
            self.repo.commit_new_root(new_root.clone())?;
            self.store.root_node_id = Some(new_root.id);
        }

        let mut current_id = self.store.root_node_id.expect("just set");
        loop {
            let mut node = self.repo.get(current_id)?.ok_or(Error::NotFound)?;
            if node.is_leaf() {
                let pos = match Self::search_node(&node, &item.key, self.comparer) {
                    Ok(i) | Err(i) => i,
                };
                node_insert_at(&mut node, pos, item.clone());
                node.version += 1;
                self.repo.update(node)?;
                break;
            }

            let pos = match Self::search_node(&node, &item.key, self.comparer) {
                Ok(i) => i + 1,
                Err(i) => i,
            };
            let child_id = node.children_ids[pos].ok_or(Error::NotFound)?;
            let mut child = self.repo.get(child_id)?.ok_or(Error::NotFound)?;

            if child.count as usize == slot_length {
                let (promoted, mut right) = self.split_node(&mut child, slot_length);
                right.parent_id = Some(node.id);
                let promoted_key = promoted.key.clone();
                insert_item_with_right_child(&mut node, pos, promoted, right.id);
                self.repo.update(child.clone())?;
                self.repo.put_new(right.clone())?;
                self.repo.update(node)?;

                current_id = if self.comparer.compare(&item.key, &promoted_key) == Ordering::Greater {
                    right.id
                } else {
                    child.id
                };
            } else {
                current_id = child.id;
            }
        }

        self.store.count_delta += 1;
        self.track_added(item_id, 0, item.key);
        Ok(item_id)
    }

    fn track_added(&mut self, item_id: Uuid, observed_version: u32, key: Vec<u8>) {
        self.tracker.record(TrackedItemAction {
            item_id,
            action: ItemAction::Add,
            observed_version,
            new_version_if_write: Some(0),
            key,
        });
    }

    /// Split a full node into `(promoted separator item, new right sibling)`.
    /// Leaf splits are biased by the store's [`LeafLoadBalancing`] target
    /// band rather than an even 50/50 split, so newly split leaves land in
    /// the configured load range immediately.
    fn split_node(&self, node: &mut Node, slot_length: usize) -> (Item, Node) {
        let mid = if node.is_leaf() {
            biased_split_point(slot_length, &self.store.leaf_load_balancing)
        } else {
            slot_length / 2
        };

        let promoted = node.slots[mid].take().expect("full node has every slot occupied");
        let mut right = if node.is_leaf() {
            Node::new_leaf(slot_length)
        } else {
            Node::new_inner(slot_length)
        };

        for i in (mid + 1)..slot_length {
            right.slots[i - mid - 1] = node.slots[i].take();
            right.count += 1;
        }
        node.count = mid as u16;

        if !node.is_leaf() {
            for i in (mid + 1)..=slot_length {
                right.children_ids[i - mid - 1] = node.children_ids[i].take();
            }
        }
        right.parent_id = node.parent_id;
        (promoted, right)
    }
}

fn biased_split_point(slot_length: usize, llb: &LeafLoadBalancing) -> usize {
    if !llb.enabled {
        return slot_length / 2;
    }
    let biased = (slot_length * llb.target_min_percent as usize) / 100;
    biased.clamp(1, slot_length - 1)
}

fn node_insert_at(node: &mut Node, idx: usize, item: Item) {
    let n = node.count as usize;
    for i in (idx..n).rev() {
        node.slots[i + 1] = node.slots[i].take();
    }
    node.slots[idx] = Some(item);
    node.count += 1;
}

fn node_remove_at(node: &mut Node, idx: usize) -> Item {
    let removed = node.slots[idx].take().expect("remove_at on occupied slot");
    let n = node.count as usize;
    for i in idx..(n - 1) {
        node.slots[i] = node.slots[i + 1].take();
    }
    node.count -= 1;
    removed
}

fn insert_item_with_right_child(node: &mut Node, idx: usize, item: Item, right_child: Uuid) {
    let n = node.count as usize;
    for i in (idx..n).rev() {
        node.slots[i + 1] = node.slots[i].take();
    }
    node.slots[idx] = Some(item);
    for i in (idx + 1..=n).rev() {
        node.children_ids[i + 1] = node.children_ids[i].take();
    }
    node.children_ids[idx + 1] = Some(right_child);
    node.count += 1;
}

/// Remove the child pointer at `idx`, given that the node currently has
/// `child_count` live child pointers (callers must pass this explicitly
/// since it's only derivable from `node.count` before a paired item
/// removal has happened).
fn children_remove_at(node: &mut Node, idx: usize, child_count: usize) -> Option<Uuid> {
    let removed = node.children_ids[idx].take();
    for i in idx..(child_count - 1) {
        node.children_ids[i] = node.children_ids[i + 1].take();
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item_tracker::DefaultItemActionTracker;
    use crate::node_repository::TxNodeRepository;
    use crate::registry::InMemoryRegistry;
    use sop_core::compare::ByteOrderComparer;
    use sop_storage::{InMemoryL2Cache, L1NodeCache, MemoryBlobStore};
    use std::sync::Arc;
    use std::time::Duration;

    fn harness(slot_length: u16, is_unique: bool) -> (TxNodeRepository, StoreInfo, ByteOrderComparer, DefaultItemActionTracker) {
        let registry: Arc<dyn sop_core::traits::Registry> =
            Arc::new(InMemoryRegistry::new(Arc::new(InMemoryL2Cache::new()), Duration::from_secs(600)));
        let blobs: Arc<dyn sop_core::traits::BlobStore> = Arc::new(MemoryBlobStore::new());
        let l1 = Arc::new(L1NodeCache::new(1000));
        let repo = TxNodeRepository::new(registry, l1, blobs, "t");
        let store = StoreInfo::new("t", slot_length, is_unique);
        (repo, store, ByteOrderComparer, DefaultItemActionTracker::new())
    }

    fn key(n: u32) -> Vec<u8> {
        n.to_be_bytes().to_vec()
    }

    fn val(n: u32) -> ItemValue {
        ItemValue::Inline(n.to_be_bytes().to_vec())
    }

    #[test]
    fn add_then_find_round_trips() {
        let (mut repo, mut store, cmp, mut tracker) = harness(4, true);
        let mut engine = BTreeEngine::new(&mut repo, &cmp, &mut store, &mut tracker);
        engine.add(key(1), val(1)).unwrap();
        assert!(engine.find(&key(1), true).unwrap());
        assert_eq!(engine.get_current_value().unwrap(), Some(val(1)));
    }

    #[test]
    fn add_duplicate_key_on_unique_store_fails() {
        let (mut repo, mut store, cmp, mut tracker) = harness(4, true);
        let mut engine = BTreeEngine::new(&mut repo, &cmp, &mut store, &mut tracker);
        engine.add(key(1), val(1)).unwrap();
        let err = engine.add(key(1), val(2)).unwrap_err();
        assert!(matches!(err, Error::DuplicateKey));
    }

    #[test]
    fn add_then_remove_then_find_fails() {
        let (mut repo, mut store, cmp, mut tracker) = harness(4, true);
        let mut engine = BTreeEngine::new(&mut repo, &cmp, &mut store, &mut tracker);
        engine.add(key(1), val(1)).unwrap();
        engine.remove(&key(1)).unwrap();
        assert!(!engine.find(&key(1), true).unwrap());
    }

    #[test]
    fn update_then_update_then_find_returns_latest() {
        let (mut repo, mut store, cmp, mut tracker) = harness(4, true);
        let mut engine = BTreeEngine::new(&mut repo, &cmp, &mut store, &mut tracker);
        engine.add(key(1), val(1)).unwrap();
        engine.update(&key(1), val(2)).unwrap();
        engine.update(&key(1), val(3)).unwrap();
        engine.find(&key(1), true).unwrap();
        assert_eq!(engine.get_current_value().unwrap(), Some(val(3)));
    }

    #[test]
    fn upsert_inserts_when_absent_and_updates_when_present() {
        let (mut repo, mut store, cmp, mut tracker) = harness(4, true);
        let mut engine = BTreeEngine::new(&mut repo, &cmp, &mut store, &mut tracker);
        engine.upsert(key(1), val(1)).unwrap();
        engine.find(&key(1), true).unwrap();
        assert_eq!(engine.get_current_value().unwrap(), Some(val(1)));
        engine.upsert(key(1), val(2)).unwrap();
        engine.find(&key(1), true).unwrap();
        assert_eq!(engine.get_current_value().unwrap(), Some(val(2)));
    }

    #[test]
    fn first_next_last_enumerate_in_key_order() {
        let (mut repo, mut store, cmp, mut tracker) = harness(4, true);
        let mut engine = BTreeEngine::new(&mut repo, &cmp, &mut store, &mut tracker);
        for n in [5u32, 1, 3, 2, 4] {
            engine.add(key(n), val(n)).unwrap();
        }
        let mut seen = Vec::new();
        assert!(engine.first().unwrap());
        loop {
            seen.push(engine.get_current_key().unwrap().unwrap());
            if !engine.next().unwrap() {
                break;
            }
        }
        let expected: Vec<Vec<u8>> = (1..=5u32).map(key).collect();
        assert_eq!(seen, expected);

        assert!(engine.last().unwrap());
        assert_eq!(engine.get_current_key().unwrap(), Some(key(5)));
    }

    #[test]
    fn insert_beyond_one_leaf_causes_split_and_still_enumerates_correctly() {
        let (mut repo, mut store, cmp, mut tracker) = harness(4, true);
        let mut engine = BTreeEngine::new(&mut repo, &cmp, &mut store, &mut tracker);
        for n in 0..50u32 {
            engine.add(key(n), val(n)).unwrap();
        }
        let mut seen = Vec::new();
        assert!(engine.first().unwrap());
        loop {
            seen.push(engine.get_current_key().unwrap().unwrap());
            if !engine.next().unwrap() {
                break;
            }
        }
        let expected: Vec<Vec<u8>> = (0..50u32).map(key).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn delete_many_then_remaining_items_still_enumerate_in_order() {
        let (mut repo, mut store, cmp, mut tracker) = harness(4, true);
        let mut engine = BTreeEngine::new(&mut repo, &cmp, &mut store, &mut tracker);
        for n in 0..30u32 {
            engine.add(key(n), val(n)).unwrap();
        }
        for n in (0..30u32).step_by(2) {
            engine.remove(&key(n)).unwrap();
        }
        let mut seen = Vec::new();
        assert!(engine.first().unwrap());
        loop {
            seen.push(engine.get_current_key().unwrap().unwrap());
            if !engine.next().unwrap() {
                break;
            }
        }
        let expected: Vec<Vec<u8>> = (0..30u32).step_by(2).map(|n| n + 1).map(key).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn count_reflects_inserts_and_removals() {
        let (mut repo, mut store, cmp, mut tracker) = harness(4, true);
        let mut engine = BTreeEngine::new(&mut repo, &cmp, &mut store, &mut tracker);
        for n in 0..10u32 {
            engine.add(key(n), val(n)).unwrap();
        }
        assert_eq!(engine.count(), 10);
        engine.remove(&key(0)).unwrap();
        assert_eq!(engine.count(), 9);
    }

    #[test]
    fn add_if_not_exist_respects_existing_key_even_on_non_unique_store() {
        let (mut repo, mut store, cmp, mut tracker) = harness(4, false);
        let mut engine = BTreeEngine::new(&mut repo, &cmp, &mut store, &mut tracker);
        assert!(engine.add_if_not_exist(key(1), val(1)).unwrap());
        assert!(!engine.add_if_not_exist(key(1), val(2)).unwrap());
    }
}
