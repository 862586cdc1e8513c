//! Transaction lifecycle, two-phase commit, and crash recovery.
//!
//! [`manager::TransactionManager`] owns the shared collaborators (registry,
//! blob store, L1/L2 caches, store catalog, transaction/priority logs) and
//! hands out [`transaction::Transaction`]s. A transaction's reads and
//! writes run entirely against an in-memory working set
//! ([`sop_engine::TxNodeRepository`]) until [`transaction::Transaction::commit`]
//! runs the two-phase protocol from spec §4.7: stage blobs and take OOA
//! locks, recheck every touched resource twice, then flip every
//! [`sop_core::handle::Handle`] atomically. [`recovery::RecoveryServicer`]
//! sweeps the priority log for transactions a crash left undetermined.

mod clock;
pub mod manager;
pub mod recovery;
pub mod retry;
pub mod store_repository;
pub mod transaction;

pub use manager::TransactionManager;
pub use recovery::RecoveryServicer;
pub use retry::retry_transient;
pub use store_repository::DefaultStoreRepository;
pub use transaction::Transaction;
