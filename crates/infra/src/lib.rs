//! Infrastructure layer: persistence, retry, configuration and the service facades
//! the transport calls into.

pub mod config;
pub mod retry;
pub mod services;
pub mod store;


pub use config::{AppConfig, ConfigError, Environment};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use services::{
    AggregationEngine, CustomerDirectory, EntryQueries, EntryStore, LedgerServices, ServiceError,
    ServiceResult,
};
pub use store::{LedgerStore, StoreError, StoreResult, WriteOutcome};
