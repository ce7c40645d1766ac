//! Shared wiring for the settlement integration suites.

#![allow(dead_code)]

use std::sync::Arc;

use prizeledger_custody::{
    EntryFeeProcessor, EscrowManager, PaymentAccountRegistry, PrizePoolManager,
    SponsorshipContributionLedger,
};
use prizeledger_settlement::{
    EscrowConservation, FinancialAnalytics, PrizeDistributionCalculator, PrizeDistributor,
    PrizePayoutExecutor, RefundProcessor,
};
use prizeledger_store::InMemoryLedgerStore;
use prizeledger_types::{
    FakeProcessor, LedgerConfig, PaymentMethod, ProcessorRegistry, UserId,
};

pub type Store = InMemoryLedgerStore;

pub struct Ledger {
    pub store: Arc<Store>,
    pub accounts: PaymentAccountRegistry<Store>,
    pub escrows: EscrowManager<Store>,
    pub pools: PrizePoolManager<Store>,
    pub sponsors: SponsorshipContributionLedger<Store>,
    pub entry_fees: EntryFeeProcessor<Store>,
    pub calculator: PrizeDistributionCalculator<Store>,
    pub payouts: PrizePayoutExecutor<Store>,
    pub distributor: PrizeDistributor<Store>,
    pub refunds: RefundProcessor<Store>,
    pub conservation: EscrowConservation<Store>,
    pub analytics: FinancialAnalytics<Store>,
    pub paypal: Arc<FakeProcessor>,
    pub stripe: Arc<FakeProcessor>,
}

impl Ledger {
    pub fn new() -> Self {
        init_tracing();
        let config = LedgerConfig::default();
        let store = Arc::new(Store::with_config(&config));
        let paypal = Arc::new(FakeProcessor::approving("paypal"));
        let stripe = Arc::new(FakeProcessor::approving("stripe"));
        let registry = ProcessorRegistry::new()
            .with(PaymentMethod::Paypal, paypal.clone())
            .with(PaymentMethod::Stripe, stripe.clone());

        Self {
            accounts: PaymentAccountRegistry::new(Arc::clone(&store)),
            escrows: EscrowManager::new(Arc::clone(&store), &config),
            pools: PrizePoolManager::new(Arc::clone(&store)),
            sponsors: SponsorshipContributionLedger::new(Arc::clone(&store)),
            entry_fees: EntryFeeProcessor::new(Arc::clone(&store), registry.clone(), &config),
            calculator: PrizeDistributionCalculator::new(Arc::clone(&store)),
            payouts: PrizePayoutExecutor::new(Arc::clone(&store), registry.clone(), &config),
            distributor: PrizeDistributor::new(Arc::clone(&store), registry, &config),
            refunds: RefundProcessor::new(Arc::clone(&store)),
            conservation: EscrowConservation::new(Arc::clone(&store)),
            analytics: FinancialAnalytics::new(Arc::clone(&store)),
            store,
            paypal,
            stripe,
        }
    }

    /// A user with one verified account on `method`.
    pub fn verified_user(&self, method: PaymentMethod) -> UserId {
        let user = UserId::new();
        let account = self
            .accounts
            .register_account(user, method, &format!("{user}@players.example"), vec![0xAB])
            .unwrap();
        self.accounts.verify_account(account.id).unwrap();
        user
    }
}

/// Route ledger logs through the test harness's captured output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}
