//! [`BTree`]: a typed view over one store within a [`Transaction`] (spec
//! §1, §4.10).
//!
//! Keys are raw, already-ordered byte sequences: the engine's default
//! comparer ([`sop_core::compare::ByteOrderComparer`]) orders items by
//! lexicographic byte comparison, so a key type must already encode to
//! bytes in the order it should iterate. An arbitrary `serde`-derived
//! encoding would silently iterate in the wrong order — JSON-encoded
//! integers, for instance, compare as text, not as numbers — so `K` is
//! constrained to `AsRef<[u8]>` rather than `Serialize`. Values carry no
//! such constraint and are marshaled with `serde_json`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sop_concurrency::Transaction;
use sop_core::error::{Error, Result};
use std::marker::PhantomData;
use uuid::Uuid;

/// Typed view over one store, borrowing a [`Transaction`] for its lifetime.
pub struct BTree<'a, K, V> {
    tx: &'a mut Transaction,
    store: String,
    _key: PhantomData<K>,
    _value: PhantomData<V>,
}

impl<'a, K, V> BTree<'a, K, V>
where
    K: AsRef<[u8]>,
    V: Serialize + DeserializeOwned,
{
    /// Borrow a typed view of `store` within `tx`.
    pub fn new(tx: &'a mut Transaction, store: impl Into<String>) -> Self {
        Self {
            tx,
            store: store.into(),
            _key: PhantomData,
            _value: PhantomData,
        }
    }

    fn encode(value: &V) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<V> {
        serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Insert a new item. Fails with [`Error::DuplicateKey`] if the store is
    /// unique and the key already exists.
    pub fn add(&mut self, key: K, value: &V) -> Result<Uuid> {
        self.tx.add(&self.store, key.as_ref().to_vec(), Self::encode(value)?)
    }

    /// Insert only if no item with this key exists yet. Returns `false`
    /// instead of erroring when one already does.
    pub fn add_if_not_exist(&mut self, key: K, value: &V) -> Result<bool> {
        self.tx.add_if_not_exist(&self.store, key.as_ref().to_vec(), Self::encode(value)?)
    }

    /// Replace the value of the first item matching `key`.
    pub fn update(&mut self, key: K, value: &V) -> Result<()> {
        self.tx.update(&self.store, key.as_ref(), Self::encode(value)?)
    }

    /// Insert if absent, otherwise replace.
    pub fn upsert(&mut self, key: K, value: &V) -> Result<()> {
        self.tx.upsert(&self.store, key.as_ref().to_vec(), Self::encode(value)?)
    }

    /// Replace the value of the item the cursor currently sits on.
    pub fn update_current(&mut self, value: &V) -> Result<()> {
        self.tx.update_current(&self.store, Self::encode(value)?)
    }

    /// Remove the first item matching `key`.
    pub fn remove(&mut self, key: K) -> Result<()> {
        self.tx.remove(&self.store, key.as_ref())
    }

    /// Remove the item the cursor currently sits on.
    pub fn remove_current(&mut self) -> Result<()> {
        self.tx.remove_current(&self.store)
    }

    /// Position the cursor on the first item matching `key`.
    pub fn find(&mut self, key: K) -> Result<bool> {
        self.tx.find(&self.store, key.as_ref())
    }

    /// Position the cursor on the item matching both `key` and `item_id`,
    /// disambiguating duplicate keys in a non-unique store.
    pub fn find_with_id(&mut self, key: K, item_id: Uuid) -> Result<bool> {
        self.tx.find_with_id(&self.store, key.as_ref(), item_id)
    }

    /// Position the cursor on the first item in key order.
    pub fn first(&mut self) -> Result<bool> {
        self.tx.first(&self.store)
    }

    /// Position the cursor on the last item in key order.
    pub fn last(&mut self) -> Result<bool> {
        self.tx.last(&self.store)
    }

    /// Advance the cursor to the next item.
    pub fn next(&mut self) -> Result<bool> {
        self.tx.next(&self.store)
    }

    /// Move the cursor to the previous item.
    pub fn previous(&mut self) -> Result<bool> {
        self.tx.previous(&self.store)
    }

    /// The raw key bytes of the item the cursor currently sits on.
    pub fn current_key(&mut self) -> Result<Option<Vec<u8>>> {
        self.tx.get_current_key(&self.store)
    }

    /// The decoded value of the item the cursor currently sits on,
    /// resolving out-of-line values through cache or blob store as needed.
    pub fn current_value(&mut self) -> Result<Option<V>> {
        match self.tx.get_current_value(&self.store)? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Number of items currently in the store.
    pub fn count(&mut self) -> Result<i64> {
        self.tx.count(&self.store)
    }

    /// Whether this store enforces unique keys.
    pub fn is_unique(&mut self) -> Result<bool> {
        self.tx.is_unique(&self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{StoreOptions, StoreSize};
    use crate::store::Store;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Order {
        customer: String,
        total_cents: u64,
    }

    fn store_with(name: &str, unique: bool) -> Store {
        let store = Store::open_in_memory();
        store
            .configure_store(StoreOptions::new(name, 8, unique, StoreSize::Small))
            .unwrap();
        store
    }

    #[test]
    fn typed_add_and_find_round_trips_through_json() {
        let backend = store_with("orders", true);
        let mut tx = backend.begin();
        {
            let mut tree: BTree<&[u8], Order> = BTree::new(&mut tx, "orders");
            tree.add(
                b"order-1".as_slice(),
                &Order { customer: "ada".into(), total_cents: 4200 },
            )
            .unwrap();
        }
        tx.commit().unwrap();

        let mut check = backend.begin_read_only();
        let mut tree: BTree<&[u8], Order> = BTree::new(&mut check, "orders");
        assert!(tree.find(b"order-1".as_slice()).unwrap());
        assert_eq!(
            tree.current_value().unwrap(),
            Some(Order { customer: "ada".into(), total_cents: 4200 })
        );
    }

    #[test]
    fn typed_upsert_then_update_current_replaces_value() {
        let backend = store_with("orders", true);
        let mut tx = backend.begin();
        let mut tree: BTree<&[u8], Order> = BTree::new(&mut tx, "orders");
        tree.upsert(
            b"order-1".as_slice(),
            &Order { customer: "ada".into(), total_cents: 4200 },
        )
        .unwrap();
        tree.find(b"order-1".as_slice()).unwrap();
        tree.update_current(&Order { customer: "ada".into(), total_cents: 5000 }).unwrap();
        assert_eq!(
            tree.current_value().unwrap(),
            Some(Order { customer: "ada".into(), total_cents: 5000 })
        );
    }

    #[test]
    fn typed_iteration_visits_keys_in_byte_order() {
        let backend = store_with("orders", true);
        let mut tx = backend.begin();
        let mut tree: BTree<&[u8], Order> = BTree::new(&mut tx, "orders");
        for key in [b"b".as_slice(), b"a".as_slice(), b"c".as_slice()] {
            tree.add(key, &Order { customer: "x".into(), total_cents: 1 }).unwrap();
        }
        assert!(tree.first().unwrap());
        let mut seen = Vec::new();
        loop {
            seen.push(tree.current_key().unwrap().unwrap());
            if !tree.next().unwrap() {
                break;
            }
        }
        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }
}
