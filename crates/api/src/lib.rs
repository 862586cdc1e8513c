//! Public facade: open a store backend, configure stores, and read/write
//! them through transactions — either byte-oriented ([`Transaction`]
//! directly) or typed ([`BTree`]).
//!
//! ```no_run
//! use sop_api::{BTree, Store, StoreOptions, StoreSize};
//!
//! let backend = Store::open_in_memory();
//! backend.configure_store(StoreOptions::new("orders", 8, true, StoreSize::Small)).unwrap();
//!
//! let mut tx = backend.begin();
//! {
//!     let mut orders: BTree<&[u8], String> = BTree::new(&mut tx, "orders");
//!     orders.add(b"order-1".as_slice(), &"ada".to_string()).unwrap();
//! }
//! tx.commit().unwrap();
//! ```

mod btree;
mod options;
mod store;

pub use btree::BTree;
pub use options::{StoreOptions, StoreSize};
pub use sop_concurrency::{retry_transient, Transaction};
pub use sop_core::config::GlobalConfig;
pub use sop_core::error::{Error, Result};
pub use sop_core::store::{LeafLoadBalancing, StoreCacheConfig};
pub use store::Store;
