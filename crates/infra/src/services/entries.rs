use std::sync::Arc;

use tracing::instrument;

use khata_core::{BusinessZone, Clock, CustomerId, EntryId, UserId};
use khata_ledger::{EntryFilter, EntryPatch, LedgerEntry, NewEntry};

use super::{ServiceError, ServiceResult, resolve};
use crate::store::LedgerStore;

/// Append/update/delete log of ledger entries.
///
/// Every write checks, inside the store's transaction, that the entry's customer
/// belongs to the acting user.
#[derive(Clone)]
pub struct EntryStore {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    zone: BusinessZone,
}

impl EntryStore {
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>, zone: BusinessZone) -> Self {
        Self { store, clock, zone }
    }

    /// Record a new entry under a server-assigned id.
    #[instrument(skip_all, fields(user_id = %user, customer_id = %input.customer_id), err)]
    pub async fn append(&self, user: UserId, input: NewEntry) -> ServiceResult<LedgerEntry> {
        let entry = LedgerEntry::record(EntryId::new(), input, self.clock.now());
        let entry = resolve(self.store.insert_entry(user, &entry).await?, "ledger entry")?;
        tracing::info!(entry_type = %entry.entry_type(), amount = %entry.amount(), "entry appended");
        Ok(entry)
    }

    #[instrument(skip_all, fields(user_id = %user, entry_id = %id), err)]
    pub async fn get(&self, id: EntryId, user: UserId) -> ServiceResult<LedgerEntry> {
        self.store
            .find_entry(user, id)
            .await?
            .ok_or(ServiceError::NotFound)
    }

    #[instrument(skip_all, fields(user_id = %user, entry_id = %id), err)]
    pub async fn update(&self, id: EntryId, user: UserId, patch: EntryPatch) -> ServiceResult<LedgerEntry> {
        let updated = resolve(
            self.store.update_entry(user, id, &patch, self.clock.now()).await?,
            "ledger entry",
        )?;
        tracing::info!("entry updated");
        Ok(updated)
    }

    /// Permanent delete. Deleting an absent entry is `NotFound` every time.
    #[instrument(skip_all, fields(user_id = %user, entry_id = %id), err)]
    pub async fn delete(&self, id: EntryId, user: UserId) -> ServiceResult<()> {
        resolve(self.store.delete_entry(user, id).await?, "ledger entry")?;
        tracing::info!("entry deleted");
        Ok(())
    }

    /// All entries of one customer, newest first.
    #[instrument(skip_all, fields(user_id = %user, customer_id = %customer_id), err)]
    pub async fn get_by_customer(&self, customer_id: CustomerId, user: UserId) -> ServiceResult<Vec<LedgerEntry>> {
        self.store
            .customer_ledger(user, customer_id, &EntryFilter::all(), self.zone)
            .await?
            .map(|ledger| ledger.entries)
            .ok_or(ServiceError::NotFound)
    }
}
