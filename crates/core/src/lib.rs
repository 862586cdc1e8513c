//! Core data model and backend-abstraction traits for `sop`.
//!
//! This crate defines the foundational types shared by every layer of the
//! store:
//! - [`handle`]: the logical → physical [`handle::Handle`] indirection that
//!   makes copy-on-write commits possible.
//! - [`item`] / [`node`]: the B-Tree's leaf/inner node contents.
//! - [`store`]: per-store metadata ([`store::StoreInfo`]) and cache
//!   configuration ([`store::StoreCacheConfig`]).
//! - [`compare`]: key ordering ([`compare::Comparer`]).
//! - [`traits`]: the pluggable backend seams (`NodeRepository`,
//!   `ItemActionTracker`, `StoreRepository`, `Registry`, `BlobStore`,
//!   `Cache`).
//! - [`marshal`]: the pluggable serialization seam.
//! - [`error`]: the crate-wide error taxonomy.
//! - [`config`] / [`logging`]: process-wide ambient configuration.

#![warn(missing_docs)]

pub mod compare;
pub mod config;
pub mod error;
pub mod handle;
pub mod item;
pub mod logging;
pub mod marshal;
pub mod node;
pub mod store;
pub mod traits;

pub use compare::{ByteOrderComparer, Comparer, ProxyComparer};
pub use config::GlobalConfig;
pub use error::{Error, Result};
pub use handle::Handle;
pub use item::{Item, ItemValue};
pub use marshal::{BincodeMarshaler, JsonMarshaler, Marshaler};
pub use node::Node;
pub use store::{LeafLoadBalancing, StoreCacheConfig, StoreInfo};
pub use traits::{BlobStore, Cache, ItemAction, ItemActionTracker, LockKey, NodeRepository, Registry, StoreRepository, TrackedItemAction};

/// Re-export so downstream crates don't need a direct `uuid` dependency
/// just to name the id type.
pub use uuid::Uuid;

/// The nil (all-zero) UUID, used as a sentinel "no id" value where `Option`
/// would be awkward (e.g. in fixed-size on-disk layouts).
pub fn nil_uuid() -> Uuid {
    Uuid::nil()
}
