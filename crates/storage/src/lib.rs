//! Concrete [`sop_core::BlobStore`] and [`sop_core::Cache`] implementations.
//!
//! - [`blob::MemoryBlobStore`] / [`blob::FilesystemBlobStore`]: the two
//!   backends named in spec §1 as in-scope (filesystem) or as the
//!   in-memory stand-in used by tests and by [`node_cache::L1NodeCache`].
//! - [`node_cache::L1NodeCache`]: the process-local, physical-id-keyed node
//!   cache (spec §4.6).
//! - [`l2_cache::InMemoryL2Cache`]: the L2 coordinator used when no
//!   distributed cache is configured (spec's "in-memory fallback").

pub mod blob;
pub mod l2_cache;
pub mod node_cache;

pub use blob::{FilesystemBlobStore, MemoryBlobStore};
pub use l2_cache::InMemoryL2Cache;
pub use node_cache::L1NodeCache;
