//! System-wide constants for the PrizeLedger subsystem.

use rust_decimal::Decimal;

/// Fraction digits carried by every monetary value.
pub const MONEY_SCALE: u32 = 2;

/// Smallest amount a ledger row may carry (0.01).
pub const MIN_TRANSACTION_AMOUNT: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Tolerance applied to the escrow custody invariant (one cent).
pub const ESCROW_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Entry fee platform cut: 5%.
pub const ENTRY_FEE_RATE: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

/// Entry fee floor: 0.50.
pub const ENTRY_FEE_MIN: Decimal = Decimal::from_parts(50, 0, 0, false, 2);

/// Entry fee ceiling: 50.00.
pub const ENTRY_FEE_MAX: Decimal = Decimal::from_parts(5000, 0, 0, false, 2);

/// Largest entry fee accepted in a single charge: 10,000.00.
pub const MAX_ENTRY_AMOUNT: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 2);

/// Prize payout platform cut: 2%.
pub const PAYOUT_FEE_RATE: Decimal = Decimal::from_parts(2, 0, 0, false, 2);

/// Prize payout fee cap: 100.00.
pub const PAYOUT_FEE_CAP: Decimal = Decimal::from_parts(10_000, 0, 0, false, 2);

/// Days between escrow creation and its scheduled release date.
pub const DEFAULT_ESCROW_RELEASE_DAYS: i64 = 30;

/// Upper bound on the escrow release horizon (ten years).
pub const MAX_ESCROW_RELEASE_DAYS: i64 = 3_650;

/// How long a unit of work waits for a row lock before giving up.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;

/// Upper bound on the row-lock wait (ten minutes).
pub const MAX_LOCK_TIMEOUT_MS: u64 = 600_000;

/// Prefix of generated escrow account identifiers.
pub const ESCROW_ACCOUNT_PREFIX: &str = "esc_";

/// Number of hex characters kept from the escrow account digest.
pub const ESCROW_ACCOUNT_HEX_LEN: usize = 32;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn fee_constants_have_expected_values() {
        assert_eq!(ENTRY_FEE_RATE, dec!(0.05));
        assert_eq!(ENTRY_FEE_MIN, dec!(0.50));
        assert_eq!(ENTRY_FEE_MAX, dec!(50.00));
        assert_eq!(MAX_ENTRY_AMOUNT, dec!(10000.00));
        assert_eq!(PAYOUT_FEE_RATE, dec!(0.02));
        assert_eq!(PAYOUT_FEE_CAP, dec!(100.00));
        assert_eq!(MIN_TRANSACTION_AMOUNT, dec!(0.01));
    }
}
