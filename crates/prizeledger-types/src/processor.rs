//! The boundary to external payment rails.
//!
//! Each rail (card network, wallet, bank transfer) implements
//! [`ProcessorAdapter`]. The ledger treats every adapter uniformly:
//! it hands over an amount, currency and account reference, and gets back
//! either an external transaction id or a failure reason. Timeouts and
//! retries belong to the adapter, never to the ledger core.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Currency, LedgerError, PaymentMethod, Result, TransactionId};

/// What the ledger asks a rail to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorRequest {
    /// Ledger row id, passed through as the rail-side idempotency key.
    pub reference: TransactionId,
    pub amount: Decimal,
    pub currency: Currency,
    /// Source account for payments, destination account for payouts.
    pub account_ref: String,
}

/// Successful rail response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorReceipt {
    pub external_transaction_id: String,
    /// Rail-specific status text (e.g. `succeeded`, `settled`).
    pub status: String,
}

/// Declined or failed rail call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorFailure {
    pub reason: String,
}

impl fmt::Display for ProcessorFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

pub type ProcessorResult = std::result::Result<ProcessorReceipt, ProcessorFailure>;

/// One implementation per payment rail.
pub trait ProcessorAdapter: Send + Sync {
    /// Recorded on every ledger row this adapter moves money for.
    fn name(&self) -> &str;

    /// Pull money from the user into the platform.
    fn submit_payment(&self, request: &ProcessorRequest) -> ProcessorResult;

    /// Push money from the platform to the user.
    fn submit_payout(&self, request: &ProcessorRequest) -> ProcessorResult;
}

/// Routes each [`PaymentMethod`] to its adapter.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    adapters: HashMap<PaymentMethod, Arc<dyn ProcessorAdapter>>,
}

impl ProcessorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, method: PaymentMethod, adapter: Arc<dyn ProcessorAdapter>) -> Self {
        self.register(method, adapter);
        self
    }

    pub fn register(&mut self, method: PaymentMethod, adapter: Arc<dyn ProcessorAdapter>) {
        self.adapters.insert(method, adapter);
    }

    pub fn adapter_for(&self, method: PaymentMethod) -> Result<Arc<dyn ProcessorAdapter>> {
        self.adapters
            .get(&method)
            .cloned()
            .ok_or(LedgerError::ProcessorNotConfigured(method))
    }
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<_> = self.adapters.keys().copied().collect();
        methods.sort();
        f.debug_struct("ProcessorRegistry")
            .field("methods", &methods)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Deterministic fakes
// ---------------------------------------------------------------------------

#[cfg(any(test, feature = "test-helpers"))]
pub use fake::{FakeBehavior, FakeCall, FakeCallKind, FakeProcessor};

#[cfg(any(test, feature = "test-helpers"))]
mod fake {
    use std::sync::atomic::{AtomicU64, Ordering};

    use parking_lot::Mutex;
    use rust_decimal::Decimal;

    use super::{ProcessorAdapter, ProcessorFailure, ProcessorReceipt, ProcessorRequest, ProcessorResult};

    /// How a [`FakeProcessor`] answers.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum FakeBehavior {
        Approve,
        Decline(String),
        /// Approve up to and including the threshold, decline above it.
        DeclineAbove(Decimal),
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum FakeCallKind {
        Payment,
        Payout,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct FakeCall {
        pub kind: FakeCallKind,
        pub request: ProcessorRequest,
    }

    /// In-process rail with scripted answers and a call log.
    #[derive(Debug)]
    pub struct FakeProcessor {
        name: String,
        behavior: Mutex<FakeBehavior>,
        calls: Mutex<Vec<FakeCall>>,
        sequence: AtomicU64,
    }

    impl FakeProcessor {
        pub fn new(name: impl Into<String>, behavior: FakeBehavior) -> Self {
            Self {
                name: name.into(),
                behavior: Mutex::new(behavior),
                calls: Mutex::new(Vec::new()),
                sequence: AtomicU64::new(1),
            }
        }

        pub fn approving(name: impl Into<String>) -> Self {
            Self::new(name, FakeBehavior::Approve)
        }

        pub fn declining(name: impl Into<String>, reason: impl Into<String>) -> Self {
            Self::new(name, FakeBehavior::Decline(reason.into()))
        }

        pub fn set_behavior(&self, behavior: FakeBehavior) {
            *self.behavior.lock() = behavior;
        }

        pub fn calls(&self) -> Vec<FakeCall> {
            self.calls.lock().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().len()
        }

        fn answer(&self, kind: FakeCallKind, request: &ProcessorRequest) -> ProcessorResult {
            self.calls.lock().push(FakeCall {
                kind,
                request: request.clone(),
            });
            let declined = match &*self.behavior.lock() {
                FakeBehavior::Approve => None,
                FakeBehavior::Decline(reason) => Some(reason.clone()),
                FakeBehavior::DeclineAbove(limit) if request.amount > *limit => {
                    Some(format!("amount {} exceeds rail limit {limit}", request.amount))
                }
                FakeBehavior::DeclineAbove(_) => None,
            };
            if let Some(reason) = declined {
                return Err(ProcessorFailure { reason });
            }
            let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
            Ok(ProcessorReceipt {
                external_transaction_id: format!("{}_{seq:06}", self.name),
                status: "succeeded".to_string(),
            })
        }
    }

    impl ProcessorAdapter for FakeProcessor {
        fn name(&self) -> &str {
            &self.name
        }

        fn submit_payment(&self, request: &ProcessorRequest) -> ProcessorResult {
            self.answer(FakeCallKind::Payment, request)
        }

        fn submit_payout(&self, request: &ProcessorRequest) -> ProcessorResult {
            self.answer(FakeCallKind::Payout, request)
        }
    }
}
