use core::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use khata_core::{Amount, BusinessZone, CustomerId, DomainError, DomainResult, Entity, EntryId};

/// Direction of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryType {
    /// Goods or service given on account; increases what the customer owes.
    Credit,
    /// Payment received; decreases what the customer owes.
    Debit,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Credit => "CREDIT",
            EntryType::Debit => "DEBIT",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            EntryType::Credit => "Credit",
            EntryType::Debit => "Debit",
        }
    }
}

impl core::fmt::Display for EntryType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "CREDIT" => Ok(EntryType::Credit),
            "DEBIT" => Ok(EntryType::Debit),
            _ => Err(DomainError::validation("type must be CREDIT or DEBIT")),
        }
    }
}

/// One credit or debit recorded against a customer.
///
/// An entry has no owner of its own: it is visible to whoever owns `customer_id`.
/// The customer never changes after the entry is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    id: EntryId,
    customer_id: CustomerId,
    entry_type: EntryType,
    amount: Amount,
    note: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Input for recording an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub customer_id: CustomerId,
    pub entry_type: EntryType,
    pub amount: Amount,
    pub note: Option<String>,
}

/// Partial update of an entry. `None` keeps the current value; a blank note clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryPatch {
    pub entry_type: Option<EntryType>,
    pub amount: Option<Amount>,
    pub note: Option<String>,
}

impl LedgerEntry {
    /// Record a new entry at the server-assigned time `now`.
    pub fn record(id: EntryId, input: NewEntry, now: DateTime<Utc>) -> Self {
        Self {
            id,
            customer_id: input.customer_id,
            entry_type: input.entry_type,
            amount: input.amount,
            note: normalize_note(input.note.as_deref()),
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild an entry from persisted state.
    ///
    /// The amount is re-validated so a corrupt row can never enter a reduction.
    pub fn from_parts(
        id: EntryId,
        customer_id: CustomerId,
        entry_type: EntryType,
        amount: Decimal,
        note: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Ok(Self {
            id,
            customer_id,
            entry_type,
            amount: Amount::new(amount)?,
            note,
            created_at,
            updated_at,
        })
    }

    pub fn id_typed(&self) -> EntryId {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Calendar date of the entry in the business zone.
    pub fn entry_date(&self, zone: BusinessZone) -> NaiveDate {
        zone.local_date(self.created_at)
    }

    /// Produce the updated entry. Does not mutate `self`.
    pub fn apply_patch(&self, patch: &EntryPatch, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        if let Some(entry_type) = patch.entry_type {
            next.entry_type = entry_type;
        }
        if let Some(amount) = patch.amount {
            next.amount = amount;
        }
        if let Some(note) = &patch.note {
            next.note = normalize_note(Some(note));
        }
        next.updated_at = now;
        next
    }
}

impl Entity for LedgerEntry {
    type Id = EntryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Ledger display order: newest first.
///
/// Entry dates derive from `created_at` in one fixed zone, so ordering by
/// `created_at` also orders by entry date. Ties fall back to the id.
pub fn sort_ledger_order(entries: &mut [LedgerEntry]) {
    entries.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

fn normalize_note(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use rust_decimal_macros::dec;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 9, 30, 0).unwrap()
    }

    fn credit(amount: Decimal) -> LedgerEntry {
        LedgerEntry::record(
            EntryId::new(),
            NewEntry {
                customer_id: CustomerId::new(),
                entry_type: EntryType::Credit,
                amount: Amount::new(amount).unwrap(),
                note: Some("  rice, 2 sacks ".to_string()),
            },
            test_time(),
        )
    }

    #[test]
    fn entry_type_parses_only_the_two_kinds() {
        assert_eq!("CREDIT".parse::<EntryType>().unwrap(), EntryType::Credit);
        assert_eq!("DEBIT".parse::<EntryType>().unwrap(), EntryType::Debit);
        for bad in ["credit", "REFUND", "", "CREDITS"] {
            match bad.parse::<EntryType>() {
                Err(DomainError::Validation(_)) => {}
                other => panic!("expected Validation for {bad:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn entry_type_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&EntryType::Debit).unwrap(), "\"DEBIT\"");
        assert!(serde_json::from_str::<EntryType>("\"debit\"").is_err());
    }

    #[test]
    fn record_uses_server_time_and_trims_note() {
        let entry = credit(dec!(5000));
        assert_eq!(entry.created_at(), test_time());
        assert_eq!(entry.updated_at(), test_time());
        assert_eq!(entry.note(), Some("rice, 2 sacks"));
        assert_eq!(entry.amount().to_string(), "5000.00");
    }

    #[test]
    fn patch_can_flip_the_entry_type() {
        let c = credit(dec!(12.50));
        assert_eq!(c.entry_type(), EntryType::Credit);

        let d = c.apply_patch(
            &EntryPatch {
                entry_type: Some(EntryType::Debit),
                ..EntryPatch::default()
            },
            test_time(),
        );
        assert_eq!(d.entry_type(), EntryType::Debit);
        assert_eq!(d.amount(), c.amount());
    }

    #[test]
    fn apply_patch_keeps_customer_and_creation_time() {
        let entry = credit(dec!(5000));
        let later = test_time() + TimeDelta::hours(1);
        let patched = entry.apply_patch(
            &EntryPatch {
                entry_type: None,
                amount: Some(Amount::new(dec!(6000)).unwrap()),
                note: Some("New note".to_string()),
            },
            later,
        );

        assert_eq!(patched.customer_id(), entry.customer_id());
        assert_eq!(patched.created_at(), entry.created_at());
        assert_eq!(patched.updated_at(), later);
        assert_eq!(patched.amount().value(), dec!(6000));
        assert_eq!(patched.note(), Some("New note"));
        assert_eq!(patched.entry_type(), EntryType::Credit);
    }

    #[test]
    fn from_parts_rejects_non_positive_amounts() {
        let err = LedgerEntry::from_parts(
            EntryId::new(),
            CustomerId::new(),
            EntryType::Credit,
            dec!(0),
            None,
            test_time(),
            test_time(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn entry_date_is_in_business_zone() {
        let late = LedgerEntry::record(
            EntryId::new(),
            NewEntry {
                customer_id: CustomerId::new(),
                entry_type: EntryType::Debit,
                amount: Amount::new(dec!(1)).unwrap(),
                note: None,
            },
            Utc.with_ymd_and_hms(2024, 5, 10, 22, 0, 0).unwrap(),
        );
        let dhaka: BusinessZone = "+06:00".parse().unwrap();
        assert_eq!(late.entry_date(dhaka), NaiveDate::from_ymd_opt(2024, 5, 11).unwrap());
        assert_eq!(late.entry_date(BusinessZone::utc()), NaiveDate::from_ymd_opt(2024, 5, 10).unwrap());
    }

    #[test]
    fn sort_ledger_order_is_newest_first() {
        let older = credit(dec!(1));
        let mut newer = credit(dec!(2));
        newer = LedgerEntry::from_parts(
            newer.id_typed(),
            newer.customer_id(),
            newer.entry_type(),
            newer.amount().value(),
            None,
            test_time() + TimeDelta::minutes(1),
            test_time() + TimeDelta::minutes(1),
        )
        .unwrap();

        let mut entries = vec![older.clone(), newer.clone()];
        sort_ledger_order(&mut entries);
        assert_eq!(entries[0].id_typed(), newer.id_typed());
        assert_eq!(entries[1].id_typed(), older.id_typed());
    }
}
