//! Transaction log and priority log for crash recovery (spec §4.8).
//!
//! Both logs share the same operational shape — append-only records keyed
//! by `(transaction id, step)`, grouped into hourly buckets so old buckets
//! can be swept without disturbing in-flight commits — so both are built on
//! [`log::LogStore`]. The [`transaction_log::TransactionLog`] records every
//! phase-1 step of a transaction; the [`priority_log::PriorityLog`] records
//! only the minimum Registry/Handle updates the recovery servicer needs to
//! decide rollback-vs-roll-forward for a crashed transaction.

pub mod log;
pub mod priority_log;
pub mod transaction_log;

pub use log::{LogEntry, LogStore};
pub use priority_log::PriorityLog;
pub use transaction_log::TransactionLog;
