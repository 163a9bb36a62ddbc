//! Persistence boundary for customers and ledger entries.
//!
//! Every operation takes the acting user explicitly. A customer owned by someone
//! else is indistinguishable from a missing one at this level: lookups return
//! `None` and writes return [`WriteOutcome::NotFound`].
//!
//! Writes run their ownership check and their mutation as one atomic step, so an
//! entry append can never race the deletion of its customer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use khata_core::{BusinessZone, CustomerId, DomainError, EntryId, UserId};
use khata_customers::{Customer, CustomerPatch, SearchQuery};
use khata_ledger::{CustomerLedger, EntryFilter, EntryPatch, LedgerEntry};

pub mod memory;
pub mod postgres;
pub mod retrying;

pub use memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use retrying::RetryingStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Connection loss, pool timeout, serialization failure or deadlock.
    #[error("transient store failure: {0}")]
    Transient(String),

    #[error("store backend error: {0}")]
    Backend(String),

    /// A persisted row could not be turned back into a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of a write that passed through the ownership check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome<T> {
    Applied(T),
    /// The target (or, for an append, its customer) is absent or not owned.
    NotFound,
    /// A row with the same id already exists.
    Duplicate,
    /// The domain refused the change against the current state.
    Rejected(DomainError),
}

impl<T> WriteOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WriteOutcome<U> {
        match self {
            WriteOutcome::Applied(v) => WriteOutcome::Applied(f(v)),
            WriteOutcome::NotFound => WriteOutcome::NotFound,
            WriteOutcome::Duplicate => WriteOutcome::Duplicate,
            WriteOutcome::Rejected(e) => WriteOutcome::Rejected(e),
        }
    }
}

#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert_customer(&self, customer: &Customer) -> StoreResult<WriteOutcome<Customer>>;

    async fn find_customer(&self, owner: UserId, id: CustomerId) -> StoreResult<Option<Customer>>;

    /// Owner's customers, newest first.
    async fn list_customers(&self, owner: UserId) -> StoreResult<Vec<Customer>>;

    /// Owner's customers whose name or phone contains the query, newest first.
    async fn search_customers(&self, owner: UserId, query: &SearchQuery) -> StoreResult<Vec<Customer>>;

    async fn update_customer(
        &self,
        owner: UserId,
        id: CustomerId,
        patch: &CustomerPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome<Customer>>;

    /// Delete the customer and all of its entries in one transaction.
    /// Applied value is the number of entries removed with it.
    async fn delete_customer(&self, owner: UserId, id: CustomerId) -> StoreResult<WriteOutcome<u64>>;

    /// Append an entry after checking that its customer belongs to `owner`.
    async fn insert_entry(&self, owner: UserId, entry: &LedgerEntry) -> StoreResult<WriteOutcome<LedgerEntry>>;

    async fn find_entry(&self, owner: UserId, id: EntryId) -> StoreResult<Option<LedgerEntry>>;

    async fn update_entry(
        &self,
        owner: UserId,
        id: EntryId,
        patch: &EntryPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome<LedgerEntry>>;

    async fn delete_entry(&self, owner: UserId, id: EntryId) -> StoreResult<WriteOutcome<()>>;

    /// One customer with its entries matching `filter`, in ledger order, read
    /// from a single snapshot. `None` when the customer is absent or not owned.
    async fn customer_ledger(
        &self,
        owner: UserId,
        customer_id: CustomerId,
        filter: &EntryFilter,
        zone: BusinessZone,
    ) -> StoreResult<Option<CustomerLedger>>;

    /// Every customer of `owner` with all of its entries, read from a single snapshot.
    async fn owner_ledgers(&self, owner: UserId) -> StoreResult<Vec<CustomerLedger>>;
}

#[async_trait::async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn insert_customer(&self, customer: &Customer) -> StoreResult<WriteOutcome<Customer>> {
        (**self).insert_customer(customer).await
    }

    async fn find_customer(&self, owner: UserId, id: CustomerId) -> StoreResult<Option<Customer>> {
        (**self).find_customer(owner, id).await
    }

    async fn list_customers(&self, owner: UserId) -> StoreResult<Vec<Customer>> {
        (**self).list_customers(owner).await
    }

    async fn search_customers(&self, owner: UserId, query: &SearchQuery) -> StoreResult<Vec<Customer>> {
        (**self).search_customers(owner, query).await
    }

    async fn update_customer(
        &self,
        owner: UserId,
        id: CustomerId,
        patch: &CustomerPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome<Customer>> {
        (**self).update_customer(owner, id, patch, now).await
    }

    async fn delete_customer(&self, owner: UserId, id: CustomerId) -> StoreResult<WriteOutcome<u64>> {
        (**self).delete_customer(owner, id).await
    }

    async fn insert_entry(&self, owner: UserId, entry: &LedgerEntry) -> StoreResult<WriteOutcome<LedgerEntry>> {
        (**self).insert_entry(owner, entry).await
    }

    async fn find_entry(&self, owner: UserId, id: EntryId) -> StoreResult<Option<LedgerEntry>> {
        (**self).find_entry(owner, id).await
    }

    async fn update_entry(
        &self,
        owner: UserId,
        id: EntryId,
        patch: &EntryPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome<LedgerEntry>> {
        (**self).update_entry(owner, id, patch, now).await
    }

    async fn delete_entry(&self, owner: UserId, id: EntryId) -> StoreResult<WriteOutcome<()>> {
        (**self).delete_entry(owner, id).await
    }

    async fn customer_ledger(
        &self,
        owner: UserId,
        customer_id: CustomerId,
        filter: &EntryFilter,
        zone: BusinessZone,
    ) -> StoreResult<Option<CustomerLedger>> {
        (**self).customer_ledger(owner, customer_id, filter, zone).await
    }

    async fn owner_ledgers(&self, owner: UserId) -> StoreResult<Vec<CustomerLedger>> {
        (**self).owner_ledgers(owner).await
    }
}
