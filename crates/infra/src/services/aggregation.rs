//! Summaries and statistics, recomputed from entries on every call.
//!
//! Reductions run on the blocking pool and watch a [`CancellationToken`]. If the
//! calling future is dropped (client disconnect) the token is cancelled through a
//! drop guard and the reduction stops with `Interrupted`; a partial sum is never
//! returned.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::instrument;

use khata_core::{BusinessZone, CustomerId, DomainResult, UserId};
use khata_customers::Customer;
use khata_ledger::{CustomerSummary, EntryFilter, LedgerEntry, Statistics, Totals};

use super::{ServiceError, ServiceResult};
use crate::store::LedgerStore;

/// A customer's entries together with the summary computed over exactly those entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerStatement {
    pub entries: Vec<LedgerEntry>,
    pub summary: CustomerSummary,
}

impl CustomerStatement {
    pub fn customer(&self) -> &Customer {
        &self.summary.customer
    }
}

#[derive(Clone)]
pub struct AggregationEngine {
    store: Arc<dyn LedgerStore>,
    zone: BusinessZone,
}

impl AggregationEngine {
    pub fn new(store: Arc<dyn LedgerStore>, zone: BusinessZone) -> Self {
        Self { store, zone }
    }

    pub async fn summarize(&self, customer_id: CustomerId, user: UserId) -> ServiceResult<CustomerSummary> {
        self.summarize_with_cancel(customer_id, user, CancellationToken::new())
            .await
    }

    #[instrument(skip_all, fields(user_id = %user, customer_id = %customer_id), err)]
    pub async fn summarize_with_cancel(
        &self,
        customer_id: CustomerId,
        user: UserId,
        cancel: CancellationToken,
    ) -> ServiceResult<CustomerSummary> {
        let ledger = self
            .store
            .customer_ledger(user, customer_id, &EntryFilter::all(), self.zone)
            .await?
            .ok_or(ServiceError::NotFound)?;

        run_reduction(cancel, move |is_cancelled| {
            CustomerSummary::compute_interruptible(ledger, is_cancelled)
        })
        .await
    }

    pub async fn statistics(&self, user: UserId) -> ServiceResult<Statistics> {
        self.statistics_with_cancel(user, CancellationToken::new()).await
    }

    /// Business-wide figures: each customer is reduced on its own, then the
    /// per-customer totals are added.
    #[instrument(skip_all, fields(user_id = %user), err)]
    pub async fn statistics_with_cancel(&self, user: UserId, cancel: CancellationToken) -> ServiceResult<Statistics> {
        let ledgers = self.store.owner_ledgers(user).await?;
        let stats = run_reduction(cancel, move |is_cancelled| {
            Statistics::compute_interruptible(&ledgers, is_cancelled)
        })
        .await?;
        tracing::debug!(
            customers = stats.total_customers,
            entries = stats.total_entries,
            "statistics computed"
        );
        Ok(stats)
    }

    /// Entries plus their summary, both taken from the same snapshot.
    #[instrument(skip_all, fields(user_id = %user, customer_id = %customer_id), err)]
    pub async fn customer_ledger(&self, customer_id: CustomerId, user: UserId) -> ServiceResult<CustomerStatement> {
        let ledger = self
            .store
            .customer_ledger(user, customer_id, &EntryFilter::all(), self.zone)
            .await?
            .ok_or(ServiceError::NotFound)?;

        run_reduction(CancellationToken::new(), move |is_cancelled| {
            let totals = Totals::reduce_interruptible(&ledger.entries, is_cancelled)?;
            Ok(CustomerStatement {
                summary: CustomerSummary::from_totals(ledger.customer, totals),
                entries: ledger.entries,
            })
        })
        .await
    }
}

/// Run `reduce` on the blocking pool, cancelling `token` if this future is dropped.
async fn run_reduction<T, F>(token: CancellationToken, reduce: F) -> ServiceResult<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn Fn() -> bool) -> DomainResult<T> + Send + 'static,
{
    if token.is_cancelled() {
        return Err(ServiceError::Interrupted);
    }
    let guard = token.clone().drop_guard();
    let observed = token.clone();

    let joined = tokio::task::spawn_blocking(move || reduce(&|| observed.is_cancelled())).await;
    guard.disarm();

    match joined {
        Ok(result) => result.map_err(|e| {
            tracing::warn!(error = %e, "reduction stopped");
            ServiceError::from(e)
        }),
        Err(e) if e.is_cancelled() => Err(ServiceError::Interrupted),
        Err(e) => Err(ServiceError::Internal(format!("reduction task failed: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use khata_core::DomainError;
    use tokio::sync::oneshot;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dropping_the_caller_cancels_a_running_reduction() {
        let token = CancellationToken::new();
        let (started_tx, started_rx) = oneshot::channel();
        let (seen_tx, seen_rx) = oneshot::channel();

        let caller = tokio::spawn(run_reduction(token.clone(), move |cancelled: &dyn Fn() -> bool| {
            let _ = started_tx.send(());
            let deadline = Instant::now() + Duration::from_secs(5);
            while !cancelled() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(1));
            }
            let _ = seen_tx.send(cancelled());
            Ok::<_, DomainError>(())
        }));

        started_rx.await.unwrap();
        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());
        assert!(token.is_cancelled());
        assert!(seen_rx.await.unwrap(), "reduction never saw the cancellation");
    }

    #[tokio::test]
    async fn finished_reduction_leaves_the_token_alone() {
        let token = CancellationToken::new();
        let sum = run_reduction(token.clone(), |_: &dyn Fn() -> bool| Ok::<_, DomainError>(7)).await;
        assert_eq!(sum, Ok(7));
        assert!(!token.is_cancelled());

        token.cancel();
        let err = run_reduction(token, |_: &dyn Fn() -> bool| Ok::<_, DomainError>(7)).await;
        assert_eq!(err, Err(ServiceError::Interrupted));
    }
}
