//! Payment account registry.
//!
//! Accounts are registered unverified, verified by the KYC flow, and
//! soft-deactivated rather than removed. A user has at most one primary
//! account; payout lookups prefer it over other verified accounts for the
//! same method.

use std::sync::Arc;

use chrono::Utc;
use prizeledger_store::{LedgerStore, LedgerTx, RowKey};
use prizeledger_types::{
    LedgerError, PaymentAccount, PaymentAccountId, PaymentMethod, Result, UserId,
};

/// Pick the account a payout for `method` should go to: active, verified,
/// primary first, then the oldest.
#[must_use]
pub fn select_payout_account(
    accounts: &[PaymentAccount],
    method: PaymentMethod,
) -> Option<&PaymentAccount> {
    accounts
        .iter()
        .filter(|a| a.payment_method == method && a.can_receive_payout())
        .min_by_key(|a| (!a.is_primary, a.created_at, a.id))
}

/// Manages verified payout destinations per user.
pub struct PaymentAccountRegistry<S> {
    store: Arc<S>,
}

impl<S: LedgerStore> PaymentAccountRegistry<S> {
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Register a new, unverified destination. A user's first account
    /// becomes their primary.
    pub fn register_account(
        &self,
        user_id: UserId,
        method: PaymentMethod,
        account_identifier: &str,
        encrypted_details: Vec<u8>,
    ) -> Result<PaymentAccount> {
        if account_identifier.trim().is_empty() {
            return Err(LedgerError::InvalidInput {
                reason: "account identifier is empty".to_string(),
            });
        }

        let mut tx = self.store.begin();
        let existing = tx.payment_accounts_for_user(user_id);
        let mut account =
            PaymentAccount::new(user_id, method, account_identifier, encrypted_details);
        account.is_primary = existing.iter().all(|a| !a.is_active);
        tx.put_payment_account(account.clone());
        tx.commit()?;

        tracing::info!(
            user = %user_id,
            account = %account.id,
            method = %method,
            primary = account.is_primary,
            "Payment account registered"
        );
        Ok(account)
    }

    /// Mark the account verified. Verifying twice keeps the first date.
    pub fn verify_account(&self, id: PaymentAccountId) -> Result<PaymentAccount> {
        let mut tx = self.store.begin();
        let mut account = tx.lock_payment_account(id)?;
        if !account.is_active {
            return Err(LedgerError::AccountDeactivated(id));
        }
        if !account.is_verified {
            account.is_verified = true;
            account.verification_date = Some(Utc::now());
            tx.put_payment_account(account.clone());
            tx.commit()?;
            tracing::info!(account = %id, user = %account.user_id, "Payment account verified");
        }
        Ok(account)
    }

    /// Make `id` the user's only primary account.
    pub fn set_primary(&self, id: PaymentAccountId) -> Result<PaymentAccount> {
        let owner = self
            .store
            .payment_account(id)
            .ok_or(LedgerError::PaymentAccountNotFound(id))?
            .user_id;

        let mut tx = self.store.begin();
        // All of the user's rows change together; lock them in key order.
        let mut ids: Vec<_> = tx
            .payment_accounts_for_user(owner)
            .into_iter()
            .map(|a| a.id)
            .collect();
        ids.sort_unstable();
        for account_id in &ids {
            tx.lock(RowKey::PaymentAccount(*account_id))?;
        }

        let target = tx
            .payment_account(id)
            .ok_or(LedgerError::PaymentAccountNotFound(id))?;
        target.ensure_payable()?;

        for account_id in ids {
            let Some(mut account) = tx.payment_account(account_id) else {
                continue;
            };
            let primary = account_id == id;
            if account.is_primary != primary {
                account.is_primary = primary;
                tx.put_payment_account(account);
            }
        }
        tx.commit()?;

        tracing::info!(account = %id, user = %owner, "Primary payment account changed");
        self.store
            .payment_account(id)
            .ok_or(LedgerError::PaymentAccountNotFound(id))
    }

    /// Soft-deactivate. The row stays for the audit trail.
    pub fn deactivate(&self, id: PaymentAccountId) -> Result<PaymentAccount> {
        let mut tx = self.store.begin();
        let mut account = tx.lock_payment_account(id)?;
        if account.is_active {
            account.is_active = false;
            account.is_primary = false;
            tx.put_payment_account(account.clone());
            tx.commit()?;
            tracing::info!(account = %id, user = %account.user_id, "Payment account deactivated");
        }
        Ok(account)
    }

    pub fn get_account(&self, id: PaymentAccountId) -> Result<PaymentAccount> {
        self.store
            .payment_account(id)
            .ok_or(LedgerError::PaymentAccountNotFound(id))
    }

    pub fn accounts_for_user(&self, user_id: UserId) -> Vec<PaymentAccount> {
        self.store.payment_accounts_for_user(user_id)
    }

    /// The account a payout for `method` would be sent to.
    pub fn verified_account_for(
        &self,
        user_id: UserId,
        method: PaymentMethod,
    ) -> Result<PaymentAccount> {
        let accounts = self.store.payment_accounts_for_user(user_id);
        select_payout_account(&accounts, method)
            .cloned()
            .ok_or(LedgerError::NoVerifiedAccount {
                user: user_id,
                method,
            })
    }
}
