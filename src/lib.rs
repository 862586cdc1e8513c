//! `sop` — embedded, ACID-transactional, ordered key/value store.
//!
//! This crate is a thin re-export of [`sop_api`], the public facade. See
//! `sop_api` for `BTree`, `Transaction`, `StoreOptions`, and `configure_store`.

pub use sop_api::*;
