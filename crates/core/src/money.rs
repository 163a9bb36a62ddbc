//! Fixed-precision money.
//!
//! Every amount in the ledger is an exact decimal with two fractional digits.
//! Arithmetic on [`Decimal`] is exact, so sums never accumulate binary rounding
//! error; rounding happens once, on final results, via [`round_money`].

use core::fmt;
use core::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Number of fractional digits carried by every stored amount.
pub const MONEY_SCALE: u32 = 2;

/// Largest number of integral digits an amount may have (NUMERIC(12, 2)).
const MAX_INTEGRAL_DIGITS: u32 = 10;

/// Round a computed total to money precision (half away from zero).
///
/// The result always carries exactly [`MONEY_SCALE`] fractional digits, so
/// `0` renders as `0.00`.
pub fn round_money(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

/// A strictly positive ledger amount with at most two fractional digits.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Amount(Decimal);

impl Amount {
    /// Validate and normalise an amount.
    ///
    /// Rejects zero, negatives, more than two fractional digits and values that do
    /// not fit NUMERIC(12, 2).
    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value <= Decimal::ZERO {
            return Err(DomainError::validation("amount must be greater than zero"));
        }
        if value.normalize().scale() > MONEY_SCALE {
            return Err(DomainError::validation(format!(
                "amount must have at most {MONEY_SCALE} decimal places"
            )));
        }
        if value.trunc() >= Decimal::from(10_i64.pow(MAX_INTEGRAL_DIGITS)) {
            return Err(DomainError::validation(format!(
                "amount must have at most {MAX_INTEGRAL_DIGITS} integral digits"
            )));
        }

        let mut normalised = value;
        normalised.rescale(MONEY_SCALE);
        Ok(Self(normalised))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl ValueObject for Amount {}

impl TryFrom<Decimal> for Amount {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl FromStr for Amount {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim())
            .map_err(|_| DomainError::validation(format!("amount '{s}' is not a decimal number")))?;
        Self::new(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = <Decimal as Deserialize>::deserialize(deserializer)?;
        Self::new(value).map_err(serde::de::Error::custom)
    }
}
