//! Fixed-point money helpers.
//!
//! Every monetary value in the ledger is a [`Decimal`] with two fraction
//! digits. Each computation step rounds half-up (away from zero) back to
//! the cent before the value is stored or compared.

use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::constants::MONEY_SCALE;
use crate::{LedgerError, Result};

/// Round to the cent, half-up.
#[must_use]
pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// `amount * rate`, rounded to the cent.
#[must_use]
pub fn percent_of(amount: Decimal, rate: Decimal) -> Decimal {
    round_cents(amount * rate)
}

/// Whether two amounts agree to within `tolerance`.
#[must_use]
pub fn within(a: Decimal, b: Decimal, tolerance: Decimal) -> bool {
    (a - b).abs() <= tolerance
}

/// Reject zero, negative, or sub-cent-precision amounts.
pub fn ensure_positive(field: &'static str, amount: Decimal) -> Result<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::NonPositiveAmount { field, amount });
    }
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(LedgerError::InvalidInput {
            reason: format!("{field} {amount} has more than {MONEY_SCALE} fraction digits"),
        });
    }
    Ok(round_cents(amount))
}

/// Settlement currencies accepted by the ledger. No conversion between them.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Usd,
    Eur,
    Gbp,
    Cad,
    Aud,
}

impl Currency {
    pub const ALL: [Self; 5] = [Self::Usd, Self::Eur, Self::Gbp, Self::Cad, Self::Aud];

    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
            Self::Cad => "CAD",
            Self::Aud => "AUD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.code().eq_ignore_ascii_case(s))
            .ok_or_else(|| LedgerError::UnsupportedCurrency(s.to_string()))
    }
}
