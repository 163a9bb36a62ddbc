//! Entry predicates for the query layer.
//!
//! Filters are evaluated either in memory ([`EntryFilter::matches`]) or pushed down
//! to a store as half-open UTC instant bounds ([`DateRange::utc_bounds`]). Both
//! forms select exactly the same entries.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use khata_core::{BusinessZone, DomainError, DomainResult};

use crate::entry::{EntryType, LedgerEntry};

/// Accepted date format for filter bounds.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a `YYYY-MM-DD` date. `field` names the parameter in the error message.
pub fn parse_date(field: &str, raw: &str) -> DomainResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|_| DomainError::validation(format!("invalid {field} format (YYYY-MM-DD expected)")))
}

/// Inclusive range of entry dates. Either bound may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl DateRange {
    /// Build a range, rejecting `start > end` and dates outside years 1 to 9999.
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> DomainResult<Self> {
        for (field, bound) in [("start_date", start), ("end_date", end)] {
            if bound.is_some_and(|d| !(1..=9999).contains(&d.year())) {
                return Err(DomainError::validation(format!("{field} must be between 0001-01-01 and 9999-12-31")));
            }
        }
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(DomainError::validation("start_date must not be after end_date"));
            }
        }
        Ok(Self { start, end })
    }

    /// A range with both bounds present.
    pub fn between(start: NaiveDate, end: NaiveDate) -> DomainResult<Self> {
        Self::new(Some(start), Some(end))
    }

    pub fn start(&self) -> Option<NaiveDate> {
        self.start
    }

    pub fn end(&self) -> Option<NaiveDate> {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|s| date >= s) && self.end.is_none_or(|e| date <= e)
    }

    /// Half-open `[from, until)` instant bounds equivalent to this date range in `zone`.
    pub fn utc_bounds(&self, zone: BusinessZone) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let from = self.start.and_then(|s| zone.start_of_day(s));
        let until = self
            .end
            .and_then(|e| e.succ_opt())
            .and_then(|next| zone.start_of_day(next));
        (from, until)
    }
}

/// Conjunction of optional predicates over a single customer's entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryFilter {
    pub date_range: Option<DateRange>,
    pub entry_type: Option<EntryType>,
}

impl EntryFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_type(entry_type: EntryType) -> Self {
        Self {
            date_range: None,
            entry_type: Some(entry_type),
        }
    }

    pub fn by_dates(range: DateRange) -> Self {
        Self {
            date_range: Some(range),
            entry_type: None,
        }
    }

    pub fn matches(&self, entry: &LedgerEntry, zone: BusinessZone) -> bool {
        if let Some(t) = self.entry_type {
            if entry.entry_type() != t {
                return false;
            }
        }
        if let Some(range) = &self.date_range {
            if !range.contains(entry.entry_date(zone)) {
                return false;
            }
        }
        true
    }

    /// Keep only matching entries, preserving order.
    pub fn apply(&self, entries: Vec<LedgerEntry>, zone: BusinessZone) -> Vec<LedgerEntry> {
        entries
            .into_iter()
            .filter(|e| self.matches(e, zone))
            .collect()
    }
}
