//! Ledger module: credit/debit entries per customer and their reductions.
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns. Balances are
//! never stored; they are recomputed from entries by [`summary`] on every read.

pub mod entry;
pub mod filter;
pub mod summary;

pub use entry::{EntryPatch, EntryType, LedgerEntry, NewEntry, sort_ledger_order};
pub use filter::{DateRange, EntryFilter, parse_date};
pub use summary::{CustomerLedger, CustomerSummary, Statistics, Totals};
