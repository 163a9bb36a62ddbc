//! Customer directory domain module.
//!
//! Business rules for a user's customers: registration, detail updates, ownership
//! checks and free-text search. Pure, deterministic logic (no IO, no HTTP, no storage).

pub mod customer;
pub mod search;

pub use customer::{Customer, CustomerPatch, NewCustomer, MAX_NAME_LEN, MAX_PHONE_LEN};
pub use search::{MIN_SEARCH_LEN, SearchQuery, sort_newest_first};
