use std::sync::Arc;

use tracing::instrument;

use khata_core::{Clock, CustomerId, UserId};
use khata_customers::{Customer, CustomerPatch, NewCustomer, SearchQuery};

use super::{ServiceError, ServiceResult, resolve};
use crate::store::LedgerStore;

/// Per-user customer records.
#[derive(Clone)]
pub struct CustomerDirectory {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
}

impl CustomerDirectory {
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    #[instrument(skip_all, fields(user_id = %owner), err)]
    pub async fn create(&self, owner: UserId, input: NewCustomer) -> ServiceResult<Customer> {
        let customer = Customer::register(CustomerId::new(), owner, input, self.clock.now())?;
        let customer = resolve(self.store.insert_customer(&customer).await?, "customer")?;
        tracing::info!(customer_id = %customer.id_typed(), "customer created");
        Ok(customer)
    }

    #[instrument(skip_all, fields(user_id = %user, customer_id = %id), err)]
    pub async fn get(&self, id: CustomerId, user: UserId) -> ServiceResult<Customer> {
        self.store
            .find_customer(user, id)
            .await?
            .ok_or(ServiceError::NotFound)
    }

    /// Owner's customers, newest first.
    #[instrument(skip_all, fields(user_id = %owner), err)]
    pub async fn list(&self, owner: UserId) -> ServiceResult<Vec<Customer>> {
        Ok(self.store.list_customers(owner).await?)
    }

    #[instrument(skip_all, fields(user_id = %user, customer_id = %id), err)]
    pub async fn update(&self, id: CustomerId, user: UserId, patch: CustomerPatch) -> ServiceResult<Customer> {
        patch.validate()?;
        let updated = resolve(
            self.store.update_customer(user, id, &patch, self.clock.now()).await?,
            "customer",
        )?;
        tracing::info!("customer updated");
        Ok(updated)
    }

    /// Delete the customer together with every entry recorded against it.
    #[instrument(skip_all, fields(user_id = %user, customer_id = %id), err)]
    pub async fn delete(&self, id: CustomerId, user: UserId) -> ServiceResult<()> {
        let removed = resolve(self.store.delete_customer(user, id).await?, "customer")?;
        tracing::info!(entries_removed = removed, "customer deleted");
        Ok(())
    }

    /// Case-insensitive substring search over name and phone.
    #[instrument(skip_all, fields(user_id = %owner), err)]
    pub async fn search(&self, owner: UserId, text: &str) -> ServiceResult<Vec<Customer>> {
        let query = SearchQuery::parse(text)?;
        Ok(self.store.search_customers(owner, &query).await?)
    }
}
