//! # Storage Module
//!
//! Persistent ledger backends.

mod redb_ledger;

pub use redb_ledger::RedbLedger;
