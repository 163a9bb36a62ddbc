//! Customer-scoped entry queries.
//!
//! Every query resolves the customer through the acting user first. A customer
//! the user does not own yields `NotFound`; an empty list always means "owned
//! customer, nothing matched".

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::instrument;

use khata_core::{BusinessZone, CustomerId, DomainError, DomainResult, UserId, round_money};
use khata_customers::Customer;
use khata_ledger::{CustomerLedger, DateRange, EntryFilter, EntryType, LedgerEntry, Totals};

use super::{ServiceError, ServiceResult};
use crate::store::LedgerStore;

/// Resolve the mandatory `customer_id` query parameter.
pub fn parse_customer_scope(raw: Option<&str>) -> DomainResult<CustomerId> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(id) => id.parse(),
        None => Err(DomainError::validation("customer_id is required")),
    }
}

/// Entries of one type plus their exact total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeFilterResult {
    pub customer: Customer,
    pub entry_type: EntryType,
    pub entries: Vec<LedgerEntry>,
    pub total_amount: Decimal,
    pub entries_count: u64,
}

#[derive(Clone)]
pub struct EntryQueries {
    store: Arc<dyn LedgerStore>,
    zone: BusinessZone,
}

impl EntryQueries {
    pub fn new(store: Arc<dyn LedgerStore>, zone: BusinessZone) -> Self {
        Self { store, zone }
    }

    pub async fn list_by_customer(&self, customer_id: CustomerId, user: UserId) -> ServiceResult<Vec<LedgerEntry>> {
        Ok(self.run(customer_id, user, EntryFilter::all()).await?.entries)
    }

    /// Entries whose date in the business zone falls in `[start, end]`.
    /// Either bound may be open. `start > end` is rejected before the store is read.
    pub async fn filter_by_date(
        &self,
        customer_id: CustomerId,
        user: UserId,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> ServiceResult<CustomerLedger> {
        let range = DateRange::new(start, end)?;
        self.run(customer_id, user, EntryFilter::by_dates(range)).await
    }

    pub async fn filter_by_type(
        &self,
        customer_id: CustomerId,
        user: UserId,
        entry_type: EntryType,
    ) -> ServiceResult<TypeFilterResult> {
        let CustomerLedger { customer, entries } =
            self.run(customer_id, user, EntryFilter::by_type(entry_type)).await?;

        let totals = Totals::reduce(&entries);
        let total = match entry_type {
            EntryType::Credit => totals.total_credit,
            EntryType::Debit => totals.total_debit,
        };

        Ok(TypeFilterResult {
            customer,
            entry_type,
            total_amount: round_money(total),
            entries_count: totals.entries_count,
            entries,
        })
    }

    #[instrument(skip_all, fields(user_id = %user, customer_id = %customer_id), err)]
    async fn run(&self, customer_id: CustomerId, user: UserId, filter: EntryFilter) -> ServiceResult<CustomerLedger> {
        let ledger = self
            .store
            .customer_ledger(user, customer_id, &filter, self.zone)
            .await?
            .ok_or(ServiceError::NotFound)?;
        tracing::debug!(matches = ledger.entries.len(), "entry query");
        Ok(ledger)
    }
}
