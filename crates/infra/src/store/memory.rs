use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use khata_core::{BusinessZone, CustomerId, EntryId, Owned, UserId};
use khata_customers::{Customer, CustomerPatch, SearchQuery, sort_newest_first};
use khata_ledger::{CustomerLedger, EntryFilter, EntryPatch, LedgerEntry, sort_ledger_order};

use super::{LedgerStore, StoreError, StoreResult, WriteOutcome};

#[derive(Debug, Default)]
struct State {
    customers: HashMap<CustomerId, Customer>,
    entries: HashMap<EntryId, LedgerEntry>,
}

impl State {
    fn owned_customer(&self, owner: UserId, id: CustomerId) -> Option<&Customer> {
        self.customers.get(&id).filter(|c| c.is_owned_by(owner))
    }

    /// An entry is visible to `owner` only through a customer they own.
    fn owned_entry(&self, owner: UserId, id: EntryId) -> Option<&LedgerEntry> {
        self.entries
            .get(&id)
            .filter(|e| self.owned_customer(owner, e.customer_id()).is_some())
    }

    fn entries_of(&self, customer_id: CustomerId) -> Vec<LedgerEntry> {
        let mut entries: Vec<LedgerEntry> = self
            .entries
            .values()
            .filter(|e| e.customer_id() == customer_id)
            .cloned()
            .collect();
        sort_ledger_order(&mut entries);
        entries
    }

    fn customers_of(&self, owner: UserId) -> Vec<Customer> {
        let mut customers: Vec<Customer> = self
            .customers
            .values()
            .filter(|c| c.is_owned_by(owner))
            .cloned()
            .collect();
        sort_newest_first(&mut customers);
        customers
    }
}

/// In-memory ledger store.
///
/// One lock guards customers and entries together, so every operation sees and
/// leaves a consistent state. Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<State>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert_customer(&self, customer: &Customer) -> StoreResult<WriteOutcome<Customer>> {
        let mut state = self.write()?;
        if let Some(existing) = state.customers.get(&customer.id_typed()) {
            return Ok(if existing.is_owned_by(customer.owner()) {
                WriteOutcome::Duplicate
            } else {
                WriteOutcome::NotFound
            });
        }
        state.customers.insert(customer.id_typed(), customer.clone());
        Ok(WriteOutcome::Applied(customer.clone()))
    }

    async fn find_customer(&self, owner: UserId, id: CustomerId) -> StoreResult<Option<Customer>> {
        Ok(self.read()?.owned_customer(owner, id).cloned())
    }

    async fn list_customers(&self, owner: UserId) -> StoreResult<Vec<Customer>> {
        Ok(self.read()?.customers_of(owner))
    }

    async fn search_customers(&self, owner: UserId, query: &SearchQuery) -> StoreResult<Vec<Customer>> {
        let mut customers = self.read()?.customers_of(owner);
        customers.retain(|c| query.matches(c));
        Ok(customers)
    }

    async fn update_customer(
        &self,
        owner: UserId,
        id: CustomerId,
        patch: &CustomerPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome<Customer>> {
        let mut state = self.write()?;
        let Some(current) = state.owned_customer(owner, id) else {
            return Ok(WriteOutcome::NotFound);
        };
        let updated = match current.apply_patch(patch, now) {
            Ok(c) => c,
            Err(e) => return Ok(WriteOutcome::Rejected(e)),
        };
        state.customers.insert(id, updated.clone());
        Ok(WriteOutcome::Applied(updated))
    }

    async fn delete_customer(&self, owner: UserId, id: CustomerId) -> StoreResult<WriteOutcome<u64>> {
        let mut state = self.write()?;
        if state.owned_customer(owner, id).is_none() {
            return Ok(WriteOutcome::NotFound);
        }
        let before = state.entries.len();
        state.entries.retain(|_, e| e.customer_id() != id);
        let removed = (before - state.entries.len()) as u64;
        state.customers.remove(&id);
        Ok(WriteOutcome::Applied(removed))
    }

    async fn insert_entry(&self, owner: UserId, entry: &LedgerEntry) -> StoreResult<WriteOutcome<LedgerEntry>> {
        let mut state = self.write()?;
        if state.owned_customer(owner, entry.customer_id()).is_none() {
            return Ok(WriteOutcome::NotFound);
        }
        if state.entries.contains_key(&entry.id_typed()) {
            return Ok(if state.owned_entry(owner, entry.id_typed()).is_some() {
                WriteOutcome::Duplicate
            } else {
                WriteOutcome::NotFound
            });
        }
        state.entries.insert(entry.id_typed(), entry.clone());
        Ok(WriteOutcome::Applied(entry.clone()))
    }

    async fn find_entry(&self, owner: UserId, id: EntryId) -> StoreResult<Option<LedgerEntry>> {
        Ok(self.read()?.owned_entry(owner, id).cloned())
    }

    async fn update_entry(
        &self,
        owner: UserId,
        id: EntryId,
        patch: &EntryPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome<LedgerEntry>> {
        let mut state = self.write()?;
        let Some(current) = state.owned_entry(owner, id) else {
            return Ok(WriteOutcome::NotFound);
        };
        let updated = current.apply_patch(patch, now);
        state.entries.insert(id, updated.clone());
        Ok(WriteOutcome::Applied(updated))
    }

    async fn delete_entry(&self, owner: UserId, id: EntryId) -> StoreResult<WriteOutcome<()>> {
        let mut state = self.write()?;
        if state.owned_entry(owner, id).is_none() {
            return Ok(WriteOutcome::NotFound);
        }
        state.entries.remove(&id);
        Ok(WriteOutcome::Applied(()))
    }

    async fn customer_ledger(
        &self,
        owner: UserId,
        customer_id: CustomerId,
        filter: &EntryFilter,
        zone: BusinessZone,
    ) -> StoreResult<Option<CustomerLedger>> {
        let state = self.read()?;
        let Some(customer) = state.owned_customer(owner, customer_id).cloned() else {
            return Ok(None);
        };
        let entries = filter.apply(state.entries_of(customer_id), zone);
        Ok(Some(CustomerLedger { customer, entries }))
    }

    async fn owner_ledgers(&self, owner: UserId) -> StoreResult<Vec<CustomerLedger>> {
        let state = self.read()?;
        Ok(state
            .customers_of(owner)
            .into_iter()
            .map(|customer| {
                let entries = state.entries_of(customer.id_typed());
                CustomerLedger { customer, entries }
            })
            .collect())
    }
}
