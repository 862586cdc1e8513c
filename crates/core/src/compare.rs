//! Key ordering.
//!
//! The B-Tree engine never interprets key bytes itself; it only asks a
//! [`Comparer`] for a total order. Two implementations are provided: the
//! built-in byte-lexicographic order, and a [`ProxyComparer`] that wraps an
//! externally-supplied ordering function selected by a declarative "index
//! specification" string (e.g. a composite-key field list) — the engine
//! treats that function as opaque.

use std::cmp::Ordering;

/// A total order over serialized key bytes.
pub trait Comparer: Send + Sync {
    /// Compare two serialized keys.
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Plain byte-lexicographic ordering — the default comparer used unless a
/// store configures an index specification.
#[derive(Debug, Default, Clone, Copy)]
pub struct ByteOrderComparer;

impl Comparer for ByteOrderComparer {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Wraps an externally supplied ordering function, selected by a
/// declarative index specification string. The engine never inspects
/// `spec` itself; it only exists for diagnostics and as the lookup key a
/// caller's comparer registry resolves back to an `order_fn` with. The
/// function itself is never persisted — only `spec` is, as
/// `StoreInfo::map_key_index_specification` — so reconstructing a
/// `ProxyComparer` for a store reopened in a new process still requires the
/// caller to have registered the same spec to the same ordering function
/// (see [`ProxyComparer::from_store_info`]).
pub struct ProxyComparer {
    spec: String,
    order_fn: Box<dyn Fn(&[u8], &[u8]) -> Ordering + Send + Sync>,
}

impl ProxyComparer {
    /// Build a proxy comparer from an index specification string and the
    /// ordering function it denotes.
    pub fn new(
        spec: impl Into<String>,
        order_fn: impl Fn(&[u8], &[u8]) -> Ordering + Send + Sync + 'static,
    ) -> Self {
        Self {
            spec: spec.into(),
            order_fn: Box::new(order_fn),
        }
    }

    /// Rebuild the comparer a store was configured with, from its
    /// persisted `StoreInfo` and the ordering function registered for that
    /// store's `map_key_index_specification`. Returns `None` if the store
    /// has no index specification — callers should fall back to
    /// [`ByteOrderComparer`] in that case.
    pub fn from_store_info(
        info: &crate::store::StoreInfo,
        order_fn: impl Fn(&[u8], &[u8]) -> Ordering + Send + Sync + 'static,
    ) -> Option<Self> {
        info.map_key_index_specification.clone().map(|spec| Self::new(spec, order_fn))
    }

    /// The declarative index specification this comparer was built from.
    pub fn spec(&self) -> &str {
        &self.spec
    }
}

impl Comparer for ProxyComparer {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        (self.order_fn)(a, b)
    }
}

impl std::fmt::Debug for ProxyComparer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyComparer").field("spec", &self.spec).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_order_comparer_orders_lexicographically() {
        let c = ByteOrderComparer;
        assert_eq!(c.compare(b"a", b"b"), Ordering::Less);
        assert_eq!(c.compare(b"b", b"a"), Ordering::Greater);
        assert_eq!(c.compare(b"a", b"a"), Ordering::Equal);
    }

    #[test]
    fn proxy_comparer_uses_supplied_function() {
        // reverse order, to make sure the engine really treats it as opaque
        let c = ProxyComparer::new("reverse", |a: &[u8], b: &[u8]| b.cmp(a));
        assert_eq!(c.compare(b"a", b"b"), Ordering::Greater);
        assert_eq!(c.spec(), "reverse");
    }

    #[test]
    fn from_store_info_is_none_without_an_index_specification() {
        let info = crate::store::StoreInfo::new("orders", 8, true);
        assert!(ProxyComparer::from_store_info(&info, |a: &[u8], b: &[u8]| a.cmp(b)).is_none());
    }

    #[test]
    fn from_store_info_rebuilds_the_registered_spec() {
        let mut info = crate::store::StoreInfo::new("orders", 8, true);
        info.map_key_index_specification = Some("reverse".to_string());
        let c = ProxyComparer::from_store_info(&info, |a: &[u8], b: &[u8]| b.cmp(a)).unwrap();
        assert_eq!(c.spec(), "reverse");
        assert_eq!(c.compare(b"a", b"b"), Ordering::Greater);
    }
}
