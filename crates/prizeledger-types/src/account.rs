//! Payout destinations.
//!
//! A [`PaymentAccount`] is created unverified during onboarding, becomes
//! eligible for payouts once KYC verification sets `is_verified`, and is
//! never hard-deleted: deactivation flips `is_active` instead.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{LedgerError, PaymentAccountId, Result, UserId};

/// Rails a user can be paid through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Paypal,
    Stripe,
    BankTransfer,
    CryptoBitcoin,
    CryptoEthereum,
}

impl PaymentMethod {
    /// Methods accepted for charging entry fees.
    pub const ENTRY_FEE_METHODS: [Self; 3] = [Self::Stripe, Self::Paypal, Self::BankTransfer];

    #[must_use]
    pub fn accepts_entry_fees(self) -> bool {
        Self::ENTRY_FEE_METHODS.contains(&self)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Paypal => "PAYPAL",
            Self::Stripe => "STRIPE",
            Self::BankTransfer => "BANK_TRANSFER",
            Self::CryptoBitcoin => "CRYPTO_BITCOIN",
            Self::CryptoEthereum => "CRYPTO_ETHEREUM",
        };
        f.write_str(name)
    }
}

/// A user's payout destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAccount {
    pub id: PaymentAccountId,
    pub user_id: UserId,
    pub payment_method: PaymentMethod,
    /// Rail-side reference (PayPal e-mail, Stripe account, IBAN, wallet...).
    pub account_identifier: String,
    /// Encrypted by the onboarding service; never inspected here.
    pub encrypted_details: Vec<u8>,
    pub is_verified: bool,
    pub is_primary: bool,
    pub is_active: bool,
    pub verification_date: Option<DateTime<Utc>>,
    pub last_used: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PaymentAccount {
    #[must_use]
    pub fn new(
        user_id: UserId,
        payment_method: PaymentMethod,
        account_identifier: impl Into<String>,
        encrypted_details: Vec<u8>,
    ) -> Self {
        Self {
            id: PaymentAccountId::new(),
            user_id,
            payment_method,
            account_identifier: account_identifier.into(),
            encrypted_details,
            is_verified: false,
            is_primary: false,
            is_active: true,
            verification_date: None,
            last_used: None,
            created_at: Utc::now(),
        }
    }

    /// Whether this account may receive money right now.
    #[must_use]
    pub fn can_receive_payout(&self) -> bool {
        self.is_verified && self.is_active
    }

    /// Fail unless the account is active and verified.
    pub fn ensure_payable(&self) -> Result<()> {
        if !self.is_active {
            return Err(LedgerError::AccountDeactivated(self.id));
        }
        if !self.is_verified {
            return Err(LedgerError::AccountNotVerified(self.id));
        }
        Ok(())
    }
}
