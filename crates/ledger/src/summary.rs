//! Balance reduction.
//!
//! Every summary is recomputed from entries. Sums are exact decimals; rounding to
//! money precision happens once, on the final figures, so the result does not
//! depend on the order entries are visited in.
//!
//! `Statistics` is reduced customer by customer: each customer's entries are reduced
//! to [`Totals`] exactly as for a single summary, then the per-customer totals are
//! added. Because the intermediate totals are exact, this equals reducing all of
//! the user's entries in one pass.

use rust_decimal::Decimal;
use serde::Serialize;

use khata_core::{DomainError, DomainResult, round_money};
use khata_customers::Customer;

use crate::entry::{EntryType, LedgerEntry};

/// How many entries are reduced between cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 256;

/// Exact credit/debit sums over a set of entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Totals {
    pub total_credit: Decimal,
    pub total_debit: Decimal,
    pub entries_count: u64,
}

impl Totals {
    pub fn add(&mut self, entry: &LedgerEntry) {
        match entry.entry_type() {
            EntryType::Credit => self.total_credit += entry.amount().value(),
            EntryType::Debit => self.total_debit += entry.amount().value(),
        }
        self.entries_count += 1;
    }

    pub fn merge(self, other: Totals) -> Totals {
        Totals {
            total_credit: self.total_credit + other.total_credit,
            total_debit: self.total_debit + other.total_debit,
            entries_count: self.entries_count + other.entries_count,
        }
    }

    pub fn balance(&self) -> Decimal {
        self.total_credit - self.total_debit
    }

    /// Reduce entries to totals. An empty set yields all zeros.
    pub fn reduce<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> Totals {
        let mut totals = Totals::default();
        for entry in entries {
            totals.add(entry);
        }
        totals
    }

    /// Reduce entries, giving up with [`DomainError::Interrupted`] once
    /// `is_cancelled` reports true. Never returns a partial sum.
    pub fn reduce_interruptible<'a>(
        entries: impl IntoIterator<Item = &'a LedgerEntry>,
        is_cancelled: &dyn Fn() -> bool,
    ) -> DomainResult<Totals> {
        let mut totals = Totals::default();
        for (idx, entry) in entries.into_iter().enumerate() {
            if idx % CANCEL_CHECK_INTERVAL == 0 && is_cancelled() {
                return Err(DomainError::Interrupted);
            }
            totals.add(entry);
        }
        Ok(totals)
    }
}

/// A customer together with all of its entries, read from one consistent snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerLedger {
    pub customer: Customer,
    pub entries: Vec<LedgerEntry>,
}

/// Point-in-time account summary of one customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerSummary {
    pub customer: Customer,
    pub total_credit: Decimal,
    pub total_debit: Decimal,
    pub balance: Decimal,
    pub entries_count: u64,
}

impl CustomerSummary {
    pub fn from_totals(customer: Customer, totals: Totals) -> Self {
        Self {
            customer,
            total_credit: round_money(totals.total_credit),
            total_debit: round_money(totals.total_debit),
            balance: round_money(totals.balance()),
            entries_count: totals.entries_count,
        }
    }

    pub fn compute(ledger: CustomerLedger) -> Self {
        let totals = Totals::reduce(&ledger.entries);
        Self::from_totals(ledger.customer, totals)
    }

    pub fn compute_interruptible(
        ledger: CustomerLedger,
        is_cancelled: &dyn Fn() -> bool,
    ) -> DomainResult<Self> {
        let totals = Totals::reduce_interruptible(&ledger.entries, is_cancelled)?;
        Ok(Self::from_totals(ledger.customer, totals))
    }
}

/// Business-wide figures for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Statistics {
    pub total_customers: u64,
    pub total_credit: Decimal,
    pub total_debit: Decimal,
    pub total_balance: Decimal,
    pub total_entries: u64,
}

impl Statistics {
    /// Sum already-reduced per-customer totals.
    pub fn from_customer_totals(per_customer: impl IntoIterator<Item = Totals>) -> Self {
        let mut customers = 0u64;
        let mut sum = Totals::default();
        let mut balance = Decimal::ZERO;
        for totals in per_customer {
            customers += 1;
            balance += totals.balance();
            sum = sum.merge(totals);
        }

        Self {
            total_customers: customers,
            total_credit: round_money(sum.total_credit),
            total_debit: round_money(sum.total_debit),
            total_balance: round_money(balance),
            total_entries: sum.entries_count,
        }
    }

    pub fn compute(ledgers: &[CustomerLedger]) -> Self {
        Self::from_customer_totals(ledgers.iter().map(|l| Totals::reduce(&l.entries)))
    }

    pub fn compute_interruptible(
        ledgers: &[CustomerLedger],
        is_cancelled: &dyn Fn() -> bool,
    ) -> DomainResult<Self> {
        let per_customer = ledgers
            .iter()
            .map(|l| Totals::reduce_interruptible(&l.entries, is_cancelled))
            .collect::<DomainResult<Vec<_>>>()?;
        Ok(Self::from_customer_totals(per_customer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::NewEntry;
    use chrono::Utc;
    use khata_core::{Amount, CustomerId, EntryId, UserId};
    use khata_customers::NewCustomer;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use std::cell::Cell;

    fn test_customer(owner: UserId, name: &str) -> Customer {
        Customer::register(
            CustomerId::new(),
            owner,
            NewCustomer {
                name: name.to_string(),
                ..NewCustomer::default()
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn entry(customer: &Customer, entry_type: EntryType, amount: Decimal) -> LedgerEntry {
        LedgerEntry::record(
            EntryId::new(),
            NewEntry {
                customer_id: customer.id_typed(),
                entry_type,
                amount: Amount::new(amount).unwrap(),
                note: None,
            },
            Utc::now(),
        )
    }

    fn ledger(customer: Customer, entries: &[(EntryType, Decimal)]) -> CustomerLedger {
        let entries = entries
            .iter()
            .map(|(t, a)| entry(&customer, *t, *a))
            .collect();
        CustomerLedger { customer, entries }
    }

    #[test]
    fn summarize_scenario() {
        let customer = test_customer(UserId::new(), "karim");
        let summary = CustomerSummary::compute(ledger(
            customer,
            &[
                (EntryType::Credit, dec!(5000.00)),
                (EntryType::Credit, dec!(3000.00)),
                (EntryType::Debit, dec!(2000.00)),
            ],
        ));

        assert_eq!(summary.total_credit, dec!(8000.00));
        assert_eq!(summary.total_debit, dec!(2000.00));
        assert_eq!(summary.balance, dec!(6000.00));
        assert_eq!(summary.entries_count, 3);
    }

    #[test]
    fn empty_ledger_is_all_zero() {
        let summary = CustomerSummary::compute(ledger(test_customer(UserId::new(), "rahim"), &[]));
        assert_eq!(summary.total_credit, Decimal::ZERO);
        assert_eq!(summary.total_debit, Decimal::ZERO);
        assert_eq!(summary.balance, Decimal::ZERO);
        assert_eq!(summary.balance.to_string(), "0.00");
        assert_eq!(summary.entries_count, 0);
    }

    #[test]
    fn negative_balance_when_paid_more_than_owed() {
        let summary = CustomerSummary::compute(ledger(
            test_customer(UserId::new(), "rahim"),
            &[(EntryType::Credit, dec!(2000)), (EntryType::Debit, dec!(5000))],
        ));
        assert_eq!(summary.balance, dec!(-3000.00));
    }

    #[test]
    fn many_small_amounts_sum_exactly() {
        let customer = test_customer(UserId::new(), "rahim");
        let entries: Vec<(EntryType, Decimal)> = (0..1000).map(|_| (EntryType::Credit, dec!(0.10))).collect();
        let summary = CustomerSummary::compute(ledger(customer, &entries));
        assert_eq!(summary.total_credit, dec!(100.00));
    }

    #[test]
    fn statistics_scenario() {
        let owner = UserId::new();
        let ledgers = vec![
            ledger(
                test_customer(owner, "a"),
                &[(EntryType::Credit, dec!(5000)), (EntryType::Debit, dec!(2000))],
            ),
            ledger(
                test_customer(owner, "b"),
                &[(EntryType::Credit, dec!(20000)), (EntryType::Debit, dec!(8000))],
            ),
        ];

        let stats = Statistics::compute(&ledgers);
        assert_eq!(stats.total_customers, 2);
        assert_eq!(stats.total_credit, dec!(25000));
        assert_eq!(stats.total_debit, dec!(10000));
        assert_eq!(stats.total_balance, dec!(15000));
        assert_eq!(stats.total_entries, 4);
    }

    #[test]
    fn statistics_counts_customers_without_entries() {
        let owner = UserId::new();
        let stats = Statistics::compute(&[
            ledger(test_customer(owner, "a"), &[]),
            ledger(test_customer(owner, "b"), &[(EntryType::Debit, dec!(1))]),
        ]);
        assert_eq!(stats.total_customers, 2);
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.total_balance, dec!(-1.00));
    }

    #[test]
    fn cancelled_reduction_never_yields_a_partial_sum() {
        let customer = test_customer(UserId::new(), "big");
        let entries: Vec<(EntryType, Decimal)> = (0..1000).map(|_| (EntryType::Credit, dec!(1))).collect();
        let ledger = ledger(customer, &entries);

        // Cancel after the first check has passed.
        let checks = Cell::new(0);
        let cancel_on_second_check = || {
            checks.set(checks.get() + 1);
            checks.get() > 1
        };

        let err = CustomerSummary::compute_interruptible(ledger.clone(), &cancel_on_second_check).unwrap_err();
        assert_eq!(err, DomainError::Interrupted);

        let full = CustomerSummary::compute_interruptible(ledger, &|| false).unwrap();
        assert_eq!(full.total_credit, dec!(1000));
    }

    #[test]
    fn cancelled_statistics_is_interrupted() {
        let owner = UserId::new();
        let ledgers = vec![ledger(test_customer(owner, "a"), &[(EntryType::Credit, dec!(1))])];
        assert_eq!(
            Statistics::compute_interruptible(&ledgers, &|| true).unwrap_err(),
            DomainError::Interrupted
        );
    }

    fn arb_entries() -> impl Strategy<Value = Vec<(bool, i64)>> {
        prop::collection::vec((any::<bool>(), 1i64..100_000_000i64), 0..40)
    }

    fn to_decimal_entries(raw: &[(bool, i64)]) -> Vec<(EntryType, Decimal)> {
        raw.iter()
            .map(|(credit, cents)| {
                let t = if *credit { EntryType::Credit } else { EntryType::Debit };
                (t, Decimal::new(*cents, 2))
            })
            .collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: balance equals credits minus debits, whatever the visiting order.
        #[test]
        fn balance_is_order_independent(raw in arb_entries()) {
            let customer = test_customer(UserId::new(), "c");
            let forward = ledger(customer, &to_decimal_entries(&raw));
            let mut reversed = forward.clone();
            reversed.entries.reverse();

            let expected_credit: Decimal = forward.entries.iter()
                .filter(|e| e.entry_type() == EntryType::Credit)
                .map(|e| e.amount().value())
                .sum();
            let expected_debit: Decimal = forward.entries.iter()
                .filter(|e| e.entry_type() == EntryType::Debit)
                .map(|e| e.amount().value())
                .sum();

            let a = CustomerSummary::compute(forward);
            let b = CustomerSummary::compute(reversed);

            prop_assert_eq!(a.balance, round_money(expected_credit - expected_debit));
            prop_assert_eq!(a.balance, b.balance);
            prop_assert_eq!(a.total_credit, b.total_credit);
            prop_assert_eq!(a.entries_count, raw.len() as u64);
        }

        /// Property: statistics equals the sum of per-customer summaries, and equals
        /// a direct reduction over every entry of the user.
        #[test]
        fn statistics_equals_sum_of_summaries_and_direct_reduction(
            per_customer in prop::collection::vec(arb_entries(), 0..6)
        ) {
            let owner = UserId::new();
            let ledgers: Vec<CustomerLedger> = per_customer
                .iter()
                .enumerate()
                .map(|(i, raw)| ledger(test_customer(owner, &format!("c{i}")), &to_decimal_entries(raw)))
                .collect();

            let stats = Statistics::compute(&ledgers);

            let summaries: Vec<CustomerSummary> = ledgers.iter().cloned().map(CustomerSummary::compute).collect();
            let summed_balance: Decimal = summaries.iter().map(|s| s.balance).sum();
            prop_assert_eq!(stats.total_balance, round_money(summed_balance));

            let direct = Totals::reduce(ledgers.iter().flat_map(|l| l.entries.iter()));
            prop_assert_eq!(stats.total_credit, round_money(direct.total_credit));
            prop_assert_eq!(stats.total_debit, round_money(direct.total_debit));
            prop_assert_eq!(stats.total_balance, round_money(direct.balance()));
            prop_assert_eq!(stats.total_entries, direct.entries_count);
            prop_assert_eq!(stats.total_customers, ledgers.len() as u64);
        }
    }
}
