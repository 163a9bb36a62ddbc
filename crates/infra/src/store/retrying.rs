use chrono::{DateTime, Utc};

use khata_core::{BusinessZone, CustomerId, EntryId, UserId};
use khata_customers::{Customer, CustomerPatch, SearchQuery};
use khata_ledger::{CustomerLedger, EntryFilter, EntryPatch, LedgerEntry};

use super::{LedgerStore, StoreResult, WriteOutcome};
use crate::retry::RetryPolicy;

/// Adapter that retries transient failures of the wrapped store.
///
/// Each attempt is a whole transaction of the inner store, so a retried write
/// either happened exactly once or not at all.
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait::async_trait]
impl<S> LedgerStore for RetryingStore<S>
where
    S: LedgerStore,
{
    async fn insert_customer(&self, customer: &Customer) -> StoreResult<WriteOutcome<Customer>> {
        self.policy
            .run("insert_customer", move || self.inner.insert_customer(customer))
            .await
    }

    async fn find_customer(&self, owner: UserId, id: CustomerId) -> StoreResult<Option<Customer>> {
        self.policy
            .run("find_customer", move || self.inner.find_customer(owner, id))
            .await
    }

    async fn list_customers(&self, owner: UserId) -> StoreResult<Vec<Customer>> {
        self.policy
            .run("list_customers", move || self.inner.list_customers(owner))
            .await
    }

    async fn search_customers(&self, owner: UserId, query: &SearchQuery) -> StoreResult<Vec<Customer>> {
        self.policy
            .run("search_customers", move || self.inner.search_customers(owner, query))
            .await
    }

    async fn update_customer(
        &self,
        owner: UserId,
        id: CustomerId,
        patch: &CustomerPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome<Customer>> {
        self.policy
            .run("update_customer", move || self.inner.update_customer(owner, id, patch, now))
            .await
    }

    async fn delete_customer(&self, owner: UserId, id: CustomerId) -> StoreResult<WriteOutcome<u64>> {
        self.policy
            .run("delete_customer", move || self.inner.delete_customer(owner, id))
            .await
    }

    async fn insert_entry(&self, owner: UserId, entry: &LedgerEntry) -> StoreResult<WriteOutcome<LedgerEntry>> {
        self.policy
            .run("insert_entry", move || self.inner.insert_entry(owner, entry))
            .await
    }

    async fn find_entry(&self, owner: UserId, id: EntryId) -> StoreResult<Option<LedgerEntry>> {
        self.policy
            .run("find_entry", move || self.inner.find_entry(owner, id))
            .await
    }

    async fn update_entry(
        &self,
        owner: UserId,
        id: EntryId,
        patch: &EntryPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome<LedgerEntry>> {
        self.policy
            .run("update_entry", move || self.inner.update_entry(owner, id, patch, now))
            .await
    }

    async fn delete_entry(&self, owner: UserId, id: EntryId) -> StoreResult<WriteOutcome<()>> {
        self.policy
            .run("delete_entry", move || self.inner.delete_entry(owner, id))
            .await
    }

    async fn customer_ledger(
        &self,
        owner: UserId,
        customer_id: CustomerId,
        filter: &EntryFilter,
        zone: BusinessZone,
    ) -> StoreResult<Option<CustomerLedger>> {
        self.policy
            .run("customer_ledger", move || {
                self.inner.customer_ledger(owner, customer_id, filter, zone)
            })
            .await
    }

    async fn owner_ledgers(&self, owner: UserId) -> StoreResult<Vec<CustomerLedger>> {
        self.policy
            .run("owner_ledgers", move || self.inner.owner_ledgers(owner))
            .await
    }
}
