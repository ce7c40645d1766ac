//! Error types for the PrizeLedger subsystem.
//!
//! All errors use the `PL_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by [`ErrorKind`]:
//! - 1xx: Validation errors (bad input, unsupported method/currency)
//! - 2xx: Not-found errors (escrow, pool, account, transaction)
//! - 3xx: State errors (entity in the wrong status)
//! - 4xx: Insufficient escrow funds
//! - 5xx: Processor errors (adapter declined or failed)
//! - 6xx: Concurrency errors (row lock timeout / ordering)
//! - 9xx: General / internal errors

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    Currency, EscrowStatus, PaymentAccountId, PaymentMethod, PayoutId, PayoutStatus, PrizePoolId,
    PrizePoolStatus, TournamentId, TransactionId, TransactionStatus, UserId,
};

/// Coarse error classification surfaced across the caller boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "ValidationError")]
    Validation,
    #[serde(rename = "NotFoundError")]
    NotFound,
    #[serde(rename = "StateError")]
    State,
    #[serde(rename = "InsufficientFundsError")]
    InsufficientFunds,
    #[serde(rename = "ProcessorError")]
    Processor,
    #[serde(rename = "ConcurrencyError")]
    Concurrency,
    #[serde(rename = "InternalError")]
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "ValidationError",
            Self::NotFound => "NotFoundError",
            Self::State => "StateError",
            Self::InsufficientFunds => "InsufficientFundsError",
            Self::Processor => "ProcessorError",
            Self::Concurrency => "ConcurrencyError",
            Self::Internal => "InternalError",
        };
        f.write_str(name)
    }
}

/// Central error enum for all PrizeLedger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// Missing or malformed input.
    #[error("PL_ERR_100: Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// A monetary field was zero or negative.
    #[error("PL_ERR_101: {field} must be positive, got {amount}")]
    NonPositiveAmount { field: &'static str, amount: Decimal },

    /// Amount outside the accepted window for this operation.
    #[error("PL_ERR_102: Amount {amount} outside allowed range ({min}, {max}]")]
    AmountOutOfRange {
        amount: Decimal,
        min: Decimal,
        max: Decimal,
    },

    /// Payment method not accepted by this operation.
    #[error("PL_ERR_103: Unsupported payment method: {0}")]
    UnsupportedPaymentMethod(PaymentMethod),

    /// Currency code outside the supported set.
    #[error("PL_ERR_104: Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    /// A pre-commit invariant check failed; the unit of work was aborted.
    #[error("PL_ERR_105: Invariant violation: {reason}")]
    InvariantViolation { reason: String },

    /// Distribution structure is malformed.
    #[error("PL_ERR_106: Invalid distribution structure: {reason}")]
    InvalidDistribution { reason: String },

    /// Payout details carry no payment method.
    #[error("PL_ERR_107: Payout details are missing a payment method")]
    MissingPayoutMethod,

    /// No processor adapter registered for the method.
    #[error("PL_ERR_108: No processor configured for {0}")]
    ProcessorNotConfigured(PaymentMethod),

    /// Payouts settle in the prize pool's currency; nothing is converted.
    #[error("PL_ERR_109: Tournament {tournament} pays out in {expected}, not {requested}")]
    CurrencyMismatch {
        tournament: TournamentId,
        expected: Currency,
        requested: Currency,
    },

    // =================================================================
    // Not-Found Errors (2xx)
    // =================================================================
    #[error("PL_ERR_200: No escrow for {0}")]
    EscrowNotFound(TournamentId),

    #[error("PL_ERR_201: Prize pool not found: {0}")]
    PrizePoolNotFound(PrizePoolId),

    #[error("PL_ERR_202: No prize pool for {0}")]
    NoPrizePoolForTournament(TournamentId),

    #[error("PL_ERR_203: Payment account not found: {0}")]
    PaymentAccountNotFound(PaymentAccountId),

    /// The user has no active verified account for the requested method.
    #[error("PL_ERR_204: No verified {method} account for {user}")]
    NoVerifiedAccount { user: UserId, method: PaymentMethod },

    #[error("PL_ERR_205: Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    #[error("PL_ERR_206: Prize payout not found: {0}")]
    PayoutNotFound(PayoutId),

    // =================================================================
    // State Errors (3xx)
    // =================================================================
    /// Idempotency guard: one escrow per tournament.
    #[error("PL_ERR_300: Escrow already exists for {0}")]
    EscrowAlreadyExists(TournamentId),

    #[error("PL_ERR_301: Escrow for {tournament} is {status}, expected {expected}")]
    EscrowWrongStatus {
        tournament: TournamentId,
        status: EscrowStatus,
        expected: EscrowStatus,
    },

    #[error("PL_ERR_302: Transaction {id} cannot move from {from} to {to}")]
    InvalidTransactionTransition {
        id: TransactionId,
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("PL_ERR_303: Transaction {id} is {status}, expected COMPLETED")]
    TransactionNotCompleted {
        id: TransactionId,
        status: TransactionStatus,
    },

    #[error("PL_ERR_304: Prize pool already exists for {0}")]
    PrizePoolAlreadyExists(TournamentId),

    #[error("PL_ERR_305: Prize pool {id} cannot move from {from} to {to}")]
    InvalidPoolTransition {
        id: PrizePoolId,
        from: PrizePoolStatus,
        to: PrizePoolStatus,
    },

    #[error("PL_ERR_306: Prize pool {id} is {status}")]
    PrizePoolClosed {
        id: PrizePoolId,
        status: PrizePoolStatus,
    },

    /// A committed ledger row had an immutable field edited.
    #[error("PL_ERR_307: Immutable ledger field changed on {id}: {field}")]
    ImmutableFieldChanged {
        id: TransactionId,
        field: &'static str,
    },

    #[error("PL_ERR_308: Payment account {0} is not verified")]
    AccountNotVerified(PaymentAccountId),

    #[error("PL_ERR_309: Payment account {0} is deactivated")]
    AccountDeactivated(PaymentAccountId),

    #[error("PL_ERR_310: Payout {id} cannot move from {from} to {to}")]
    InvalidPayoutTransition {
        id: PayoutId,
        from: PayoutStatus,
        to: PayoutStatus,
    },

    /// Another distribution run holds this (winner, position) slot.
    #[error("PL_ERR_311: Prize payout {0} is already in flight")]
    PayoutInFlight(PayoutId),

    // =================================================================
    // Insufficient Funds (4xx)
    // =================================================================
    #[error(
        "PL_ERR_400: Insufficient escrow funds for {tournament}: requested {requested}, locked {locked}"
    )]
    InsufficientEscrowFunds {
        tournament: TournamentId,
        requested: Decimal,
        locked: Decimal,
    },

    // =================================================================
    // Processor Errors (5xx)
    // =================================================================
    /// The payment rail declined or failed the request. A FAILED ledger
    /// row referencing `transaction` has been committed.
    #[error("PL_ERR_500: Processor {processor} failed {transaction}: {reason}")]
    ProcessorFailed {
        processor: String,
        transaction: TransactionId,
        reason: String,
    },

    // =================================================================
    // Concurrency Errors (6xx)
    // =================================================================
    #[error("PL_ERR_600: Timed out after {waited_ms}ms waiting for lock on {row}")]
    LockTimeout { row: String, waited_ms: u64 },

    /// Locks must be acquired in ascending row order.
    #[error("PL_ERR_601: Lock order violation: requested {requested} while holding {held}")]
    LockOrderViolation { requested: String, held: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    #[error("PL_ERR_900: Internal error: {0}")]
    Internal(String),

    #[error("PL_ERR_901: Serialization error: {0}")]
    Serialization(String),

    #[error("PL_ERR_902: Configuration error: {0}")]
    Configuration(String),
}

impl LedgerError {
    /// The boundary classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. }
            | Self::NonPositiveAmount { .. }
            | Self::AmountOutOfRange { .. }
            | Self::UnsupportedPaymentMethod(_)
            | Self::UnsupportedCurrency(_)
            | Self::InvariantViolation { .. }
            | Self::InvalidDistribution { .. }
            | Self::MissingPayoutMethod
            | Self::ProcessorNotConfigured(_)
            | Self::CurrencyMismatch { .. } => ErrorKind::Validation,

            Self::EscrowNotFound(_)
            | Self::PrizePoolNotFound(_)
            | Self::NoPrizePoolForTournament(_)
            | Self::PaymentAccountNotFound(_)
            | Self::NoVerifiedAccount { .. }
            | Self::TransactionNotFound(_)
            | Self::PayoutNotFound(_) => ErrorKind::NotFound,

            Self::EscrowAlreadyExists(_)
            | Self::EscrowWrongStatus { .. }
            | Self::InvalidTransactionTransition { .. }
            | Self::TransactionNotCompleted { .. }
            | Self::PrizePoolAlreadyExists(_)
            | Self::InvalidPoolTransition { .. }
            | Self::PrizePoolClosed { .. }
            | Self::ImmutableFieldChanged { .. }
            | Self::AccountNotVerified(_)
            | Self::AccountDeactivated(_)
            | Self::InvalidPayoutTransition { .. }
            | Self::PayoutInFlight(_) => ErrorKind::State,

            Self::InsufficientEscrowFunds { .. } => ErrorKind::InsufficientFunds,

            Self::ProcessorFailed { .. } => ErrorKind::Processor,

            Self::LockTimeout { .. } | Self::LockOrderViolation { .. } => ErrorKind::Concurrency,

            Self::Internal(_) | Self::Serialization(_) | Self::Configuration(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, LedgerError>;

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
