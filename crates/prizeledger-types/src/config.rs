//! Configuration for the ledger: fee policies, escrow timing, lock waits.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::{percent_of, round_cents};
use crate::{LedgerError, Result, constants};

/// Platform cut on entry fees: `clamp(amount * rate, min_fee, max_fee)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryFeePolicy {
    pub rate: Decimal,
    pub min_fee: Decimal,
    pub max_fee: Decimal,
    /// Largest single entry fee accepted.
    pub max_amount: Decimal,
}

impl EntryFeePolicy {
    /// Fee for an entry of `amount`. Never exceeds the amount itself, so
    /// the net amount cannot go negative for entries under `min_fee`.
    /// With inverted bounds `max_fee` wins.
    #[must_use]
    pub fn fee_for(&self, amount: Decimal) -> Decimal {
        let fee = percent_of(amount, self.rate)
            .max(self.min_fee)
            .min(self.max_fee);
        round_cents(fee.min(amount))
    }
}

impl Default for EntryFeePolicy {
    fn default() -> Self {
        Self {
            rate: constants::ENTRY_FEE_RATE,
            min_fee: constants::ENTRY_FEE_MIN,
            max_fee: constants::ENTRY_FEE_MAX,
            max_amount: constants::MAX_ENTRY_AMOUNT,
        }
    }
}

/// Platform cut on prize payouts: `min(amount * rate, cap)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayoutFeePolicy {
    pub rate: Decimal,
    pub cap: Decimal,
}

impl PayoutFeePolicy {
    #[must_use]
    pub fn fee_for(&self, amount: Decimal) -> Decimal {
        percent_of(amount, self.rate).min(self.cap)
    }
}

impl Default for PayoutFeePolicy {
    fn default() -> Self {
        Self {
            rate: constants::PAYOUT_FEE_RATE,
            cap: constants::PAYOUT_FEE_CAP,
        }
    }
}

/// Top-level ledger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub entry_fee: EntryFeePolicy,
    pub payout_fee: PayoutFeePolicy,
    /// Days from escrow creation to its scheduled release date.
    pub escrow_release_days: i64,
    /// Row-lock wait before a unit of work fails with a concurrency error.
    pub lock_timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            entry_fee: EntryFeePolicy::default(),
            payout_fee: PayoutFeePolicy::default(),
            escrow_release_days: constants::DEFAULT_ESCROW_RELEASE_DAYS,
            lock_timeout_ms: constants::DEFAULT_LOCK_TIMEOUT_MS,
        }
    }
}

impl LedgerConfig {
    /// Parse a (possibly partial) JSON document; missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| LedgerError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Row-lock wait, capped at [`constants::MAX_LOCK_TIMEOUT_MS`].
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms.min(constants::MAX_LOCK_TIMEOUT_MS))
    }

    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| -> Result<()> { Err(LedgerError::Configuration(msg)) };
        let unit = Decimal::ZERO..=Decimal::ONE;

        if !unit.contains(&self.entry_fee.rate) || !unit.contains(&self.payout_fee.rate) {
            return bad("fee rates must lie in [0, 1]".into());
        }
        if self.entry_fee.min_fee < Decimal::ZERO || self.entry_fee.min_fee > self.entry_fee.max_fee
        {
            return bad(format!(
                "entry fee bounds invalid: min {} max {}",
                self.entry_fee.min_fee, self.entry_fee.max_fee
            ));
        }
        if self.entry_fee.max_amount <= Decimal::ZERO {
            return bad("entry fee max_amount must be positive".into());
        }
        if self.payout_fee.cap < Decimal::ZERO {
            return bad("payout fee cap must not be negative".into());
        }
        if !(0..=constants::MAX_ESCROW_RELEASE_DAYS).contains(&self.escrow_release_days) {
            return bad(format!(
                "escrow_release_days must lie in [0, {}]",
                constants::MAX_ESCROW_RELEASE_DAYS
            ));
        }
        if !(1..=constants::MAX_LOCK_TIMEOUT_MS).contains(&self.lock_timeout_ms) {
            return bad(format!(
                "lock_timeout_ms must lie in [1, {}]",
                constants::MAX_LOCK_TIMEOUT_MS
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn entry_fee_clamps() {
        let policy = EntryFeePolicy::default();
        assert_eq!(policy.fee_for(dec!(25.00)), dec!(1.25));
        assert_eq!(policy.fee_for(dec!(5.00)), dec!(0.50));
        assert_eq!(policy.fee_for(dec!(5000.00)), dec!(50.00));
        assert_eq!(policy.fee_for(dec!(0.30)), dec!(0.30));
    }

    #[test]
    fn payout_fee_caps() {
        let policy = PayoutFeePolicy::default();
        assert_eq!(policy.fee_for(dec!(20000.00)), dec!(100.00));
        assert_eq!(policy.fee_for(dec!(1000.00)), dec!(20.00));
        assert_eq!(policy.fee_for(dec!(0.25)), dec!(0.01));
    }

    #[test]
    fn defaults_validate() {
        let cfg = LedgerConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.escrow_release_days, 30);
        assert_eq!(cfg.lock_timeout(), Duration::from_millis(5_000));
    }

    #[test]
    fn partial_json_takes_defaults() {
        let cfg = LedgerConfig::from_json_str(r#"{"lock_timeout_ms": 250, "payout_fee": {"cap": "75.00"}}"#)
            .unwrap();
        assert_eq!(cfg.lock_timeout_ms, 250);
        assert_eq!(cfg.payout_fee.cap, dec!(75.00));
        assert_eq!(cfg.payout_fee.rate, dec!(0.02));
        assert_eq!(cfg.entry_fee, EntryFeePolicy::default());
    }

    #[test]
    fn invalid_json_config_rejected() {
        let err = LedgerConfig::from_json_str(r#"{"lock_timeout_ms": 0}"#).unwrap_err();
        assert!(matches!(err, LedgerError::Configuration(_)));
        let err = LedgerConfig::from_json_str(r#"{"entry_fee": {"min_fee": "60.00"}}"#).unwrap_err();
        assert!(matches!(err, LedgerError::Configuration(_)));
        let err = LedgerConfig::from_json_str(r#"{"lock_timeout_ms": 18446744073709551615}"#)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Configuration(_)));
        let err = LedgerConfig::from_json_str(r#"{"escrow_release_days": 9223372036854775807}"#)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Configuration(_)));
    }

    #[test]
    fn unvalidated_extremes_do_not_panic() {
        let inverted = EntryFeePolicy {
            min_fee: dec!(60.00),
            max_fee: dec!(50.00),
            ..EntryFeePolicy::default()
        };
        assert_eq!(inverted.fee_for(dec!(100.00)), dec!(50.00));

        let cfg = LedgerConfig {
            lock_timeout_ms: u64::MAX,
            ..LedgerConfig::default()
        };
        assert_eq!(
            cfg.lock_timeout(),
            Duration::from_millis(constants::MAX_LOCK_TIMEOUT_MS)
        );
    }
}
