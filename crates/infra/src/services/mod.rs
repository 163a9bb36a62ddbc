//! Service facades over a [`LedgerStore`].
//!
//! These are the operations the transport calls. Each takes the acting user
//! explicitly and returns a discriminated [`ServiceError`] on failure.

use std::sync::Arc;

use thiserror::Error;

use khata_core::{BusinessZone, Clock, DomainError, SystemClock};

use crate::store::{InMemoryLedgerStore, LedgerStore, StoreError, WriteOutcome};

pub mod aggregation;
pub mod customers;
pub mod entries;
pub mod queries;

pub use aggregation::{AggregationEngine, CustomerStatement};
pub use customers::CustomerDirectory;
pub use entries::EntryStore;
pub use queries::{EntryQueries, TypeFilterResult, parse_customer_scope};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found")]
    NotFound,

    #[error("forbidden")]
    Forbidden,

    #[error("conflict: {0}")]
    Conflict(String),

    /// The computation was cancelled before completing. Safe to retry.
    #[error("interrupted")]
    Interrupted,

    /// The store kept failing transiently after bounded retries.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => ServiceError::Validation(msg),
            DomainError::NotFound => ServiceError::NotFound,
            DomainError::Forbidden => ServiceError::Forbidden,
            DomainError::Conflict(msg) => ServiceError::Conflict(msg),
            DomainError::Interrupted => ServiceError::Interrupted,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Transient(msg) => ServiceError::Unavailable(msg),
            StoreError::Backend(msg) | StoreError::Corrupt(msg) => ServiceError::Internal(msg),
        }
    }
}

/// Turn a store write outcome into the service result for `what`.
pub(crate) fn resolve<T>(outcome: WriteOutcome<T>, what: &str) -> ServiceResult<T> {
    match outcome {
        WriteOutcome::Applied(v) => Ok(v),
        WriteOutcome::NotFound => Err(ServiceError::NotFound),
        WriteOutcome::Duplicate => Err(ServiceError::Conflict(format!("{what} already exists"))),
        WriteOutcome::Rejected(e) => Err(e.into()),
    }
}

/// All four facades wired to one store, clock and business zone.
#[derive(Clone)]
pub struct LedgerServices {
    pub customers: CustomerDirectory,
    pub entries: EntryStore,
    pub aggregation: AggregationEngine,
    pub queries: EntryQueries,
    /// Business zone entry dates are computed in.
    pub zone: BusinessZone,
}

impl LedgerServices {
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>, zone: BusinessZone) -> Self {
        Self {
            customers: CustomerDirectory::new(store.clone(), clock.clone()),
            entries: EntryStore::new(store.clone(), clock, zone),
            aggregation: AggregationEngine::new(store.clone(), zone),
            queries: EntryQueries::new(store, zone),
            zone,
        }
    }

    /// Services over a fresh in-memory store and the wall clock.
    pub fn in_memory(zone: BusinessZone) -> Self {
        Self::new(Arc::new(InMemoryLedgerStore::new()), Arc::new(SystemClock), zone)
    }
}
