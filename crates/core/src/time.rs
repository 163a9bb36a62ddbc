//! Business time: the single configured zone and the server clock.
//!
//! Entry dates are the calendar date of `created_at` in one business zone that is
//! fixed for the whole process. Date filters compare against that date only.

use core::fmt;
use core::str::FromStr;
use std::sync::RwLock;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, TimeDelta, TimeZone, Utc};

use crate::error::DomainError;
use crate::value_object::ValueObject;

/// The fixed-offset zone every entry date is computed in.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BusinessZone(FixedOffset);

impl BusinessZone {
    pub fn new(offset: FixedOffset) -> Self {
        Self(offset)
    }

    pub fn utc() -> Self {
        Self(Utc.fix())
    }

    pub fn offset(&self) -> FixedOffset {
        self.0
    }

    /// Calendar date of an instant in this zone.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.0).date_naive()
    }

    /// The UTC instant at which `date` begins in this zone, or `None` when that
    /// instant falls outside chrono's representable range.
    pub fn start_of_day(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        let local_midnight = date.and_time(NaiveTime::MIN);
        let utc_naive = local_midnight.checked_sub_signed(TimeDelta::seconds(i64::from(self.0.local_minus_utc())))?;
        Some(Utc.from_utc_datetime(&utc_naive))
    }
}

impl Default for BusinessZone {
    fn default() -> Self {
        Self::utc()
    }
}

impl ValueObject for BusinessZone {}

impl fmt::Display for BusinessZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Parses `Z`, `UTC`, `+HH:MM`, `-HH:MM` or `+HHMM`.
impl FromStr for BusinessZone {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
            return Ok(Self::utc());
        }

        let invalid = || DomainError::validation(format!("invalid UTC offset '{raw}' (expected ±HH:MM)"));

        let (sign, rest) = match raw.as_bytes().first() {
            Some(b'+') => (1, &raw[1..]),
            Some(b'-') => (-1, &raw[1..]),
            _ => return Err(invalid()),
        };
        let digits: String = rest.chars().filter(|c| *c != ':').collect();
        if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
        let minutes: i32 = digits[2..].parse().map_err(|_| invalid())?;
        if minutes >= 60 {
            return Err(invalid());
        }

        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .map(Self)
            .ok_or_else(invalid)
    }
}

/// Source of server-assigned timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Copy, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.write() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: TimeDelta) {
        if let Ok(mut guard) = self.now.write() {
            *guard += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_offsets() {
        assert_eq!("+06:00".parse::<BusinessZone>().unwrap().offset().local_minus_utc(), 6 * 3600);
        assert_eq!("-0530".parse::<BusinessZone>().unwrap().offset().local_minus_utc(), -(5 * 3600 + 30 * 60));
        assert_eq!("UTC".parse::<BusinessZone>().unwrap(), BusinessZone::utc());
        assert!("+6".parse::<BusinessZone>().is_err());
        assert!("06:00".parse::<BusinessZone>().is_err());
        assert!("+05:75".parse::<BusinessZone>().is_err());
    }

    #[test]
    fn local_date_crosses_midnight_in_zone() {
        let dhaka: BusinessZone = "+06:00".parse().unwrap();
        // 20:00 UTC on the 1st is 02:00 on the 2nd in +06:00.
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap();
        assert_eq!(dhaka.local_date(at), NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
        assert_eq!(BusinessZone::utc().local_date(at), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn start_of_day_is_local_midnight() {
        let dhaka: BusinessZone = "+06:00".parse().unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        assert_eq!(dhaka.start_of_day(day), Some(Utc.with_ymd_and_hms(2024, 3, 1, 18, 0, 0).unwrap()));
        assert_eq!(dhaka.local_date(dhaka.start_of_day(day).unwrap()), day);
    }

    #[test]
    fn start_of_day_at_the_edge_of_the_calendar_is_none() {
        let dhaka: BusinessZone = "+06:00".parse().unwrap();
        assert_eq!(dhaka.start_of_day(NaiveDate::MIN), None);
        assert!(BusinessZone::utc().start_of_day(NaiveDate::MIN).is_some());
    }

    #[test]
    fn manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance(TimeDelta::hours(25));
        assert_eq!(clock.now(), Utc.with_ymd_and_hms(2024, 1, 2, 1, 0, 0).unwrap());
    }
}
