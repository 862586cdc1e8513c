//! The persistent M-way B-Tree engine and the default `NodeRepository`,
//! `ItemActionTracker`, and `Registry` implementations that back it.

pub mod btree;
pub mod item_tracker;
pub mod node_repository;
pub mod registry;

pub use btree::{BTreeEngine, Cursor};
pub use item_tracker::DefaultItemActionTracker;
pub use node_repository::TxNodeRepository;
pub use registry::InMemoryRegistry;
