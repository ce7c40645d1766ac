//! Read-only financial analytics.
//!
//! Aggregates only COMPLETED rows; PENDING and PROCESSING rows are still
//! in flight and REFUNDED rows have been reversed. Nothing here takes a
//! row lock or opens a unit of work.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use prizeledger_store::{LedgerStore, TransactionFilter};
use prizeledger_types::money::round_cents;
use prizeledger_types::{
    FinancialTransaction, LedgerError, PrizePoolId, Result, TournamentId, TransactionStatus,
    TransactionType,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lookback window ending at the query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Day,
    Week,
    #[default]
    Month,
    Quarter,
    Year,
}

impl Timeframe {
    #[must_use]
    pub fn days(self) -> i64 {
        match self {
            Self::Day => 1,
            Self::Week => 7,
            Self::Month => 30,
            Self::Quarter => 90,
            Self::Year => 365,
        }
    }

    #[must_use]
    pub fn window_start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.days())
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Quarter => "quarter",
            Self::Year => "year",
        };
        f.write_str(name)
    }
}

impl FromStr for Timeframe {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "day" | "1d" => Ok(Self::Day),
            "week" | "7d" => Ok(Self::Week),
            "month" | "30d" => Ok(Self::Month),
            "quarter" | "90d" => Ok(Self::Quarter),
            "year" | "365d" => Ok(Self::Year),
            other => Err(LedgerError::InvalidInput {
                reason: format!("unknown timeframe '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeSummary {
    pub total_amount: Decimal,
    pub total_fees: Decimal,
    pub transaction_count: usize,
    pub average_amount: Decimal,
}

impl TypeSummary {
    fn add(&mut self, tx: &FinancialTransaction) {
        self.total_amount += tx.amount;
        self.total_fees += tx.platform_fee;
        self.transaction_count += 1;
    }

    fn finish(&mut self) {
        if self.transaction_count > 0 {
            self.average_amount =
                round_cents(self.total_amount / Decimal::from(self.transaction_count));
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSummary {
    pub total_volume: Decimal,
    /// Platform revenue: fees retained across every type.
    pub total_fees: Decimal,
    pub total_net: Decimal,
    pub transaction_count: usize,
    pub entry_fees_collected: Decimal,
    pub prizes_paid: Decimal,
    pub refunds_issued: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub timeframe: Timeframe,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub by_type: BTreeMap<TransactionType, TypeSummary>,
    pub summary: PlatformSummary,
}

/// Pledged vs funded for one prize pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingGap {
    pub prize_pool_id: PrizePoolId,
    pub tournament_id: TournamentId,
    pub pledged: Decimal,
    pub funded: Decimal,
    pub locked: Decimal,
    /// `max(pledged - funded, 0)`.
    pub shortfall: Decimal,
}

pub struct FinancialAnalytics<S> {
    store: Arc<S>,
}

impl<S: LedgerStore> FinancialAnalytics<S> {
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn get_financial_analytics(&self, timeframe: Timeframe) -> AnalyticsReport {
        self.get_financial_analytics_at(timeframe, Utc::now())
    }

    /// Same as [`get_financial_analytics`](Self::get_financial_analytics)
    /// with the window anchored at `now`.
    pub fn get_financial_analytics_at(
        &self,
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> AnalyticsReport {
        let window_start = timeframe.window_start(now);
        let filter = TransactionFilter {
            created_from: Some(window_start),
            ..TransactionFilter::new().with_status(TransactionStatus::Completed)
        };

        let mut by_type: BTreeMap<TransactionType, TypeSummary> = BTreeMap::new();
        let mut summary = PlatformSummary::default();
        for tx in self
            .store
            .transactions(&filter)
            .iter()
            .filter(|tx| tx.created_at <= now)
        {
            by_type.entry(tx.transaction_type()).or_default().add(tx);
            summary.total_volume += tx.amount;
            summary.total_fees += tx.platform_fee;
            summary.total_net += tx.net_amount;
            summary.transaction_count += 1;
            match tx.transaction_type() {
                TransactionType::EntryFee => summary.entry_fees_collected += tx.amount,
                TransactionType::PrizePayout => summary.prizes_paid += tx.net_amount,
                TransactionType::Refund => summary.refunds_issued += tx.amount,
                TransactionType::SponsorshipPayment | TransactionType::PlatformFee => {}
            }
        }
        by_type.values_mut().for_each(TypeSummary::finish);

        tracing::debug!(
            %timeframe,
            rows = summary.transaction_count,
            volume = %summary.total_volume,
            "Financial analytics computed"
        );
        AnalyticsReport {
            timeframe,
            window_start,
            window_end: now,
            by_type,
            summary,
        }
    }

    /// How far the pool's pledges run ahead of actual escrow funding.
    pub fn funding_gap(&self, prize_pool_id: PrizePoolId) -> Result<FundingGap> {
        let pool = self
            .store
            .prize_pool(prize_pool_id)
            .ok_or(LedgerError::PrizePoolNotFound(prize_pool_id))?;
        let escrow = self.store.escrow(pool.tournament_id);
        let funded = escrow.as_ref().map_or(Decimal::ZERO, |e| e.total_amount);
        let locked = escrow.as_ref().map_or(Decimal::ZERO, |e| e.locked_amount);
        Ok(FundingGap {
            prize_pool_id,
            tournament_id: pool.tournament_id,
            pledged: pool.total_prize_amount,
            funded,
            locked,
            shortfall: (pool.total_prize_amount - funded).max(Decimal::ZERO),
        })
    }

    /// Rows still PENDING or PROCESSING that were created at least
    /// `older_than` before `now`: candidates for reconciliation with the
    /// processor, since the money may have moved without the row being
    /// finalized.
    pub fn stale_pending(
        &self,
        older_than: Duration,
        now: DateTime<Utc>,
    ) -> Vec<FinancialTransaction> {
        let cutoff = now - older_than;
        let filter = TransactionFilter::new()
            .with_status(TransactionStatus::Pending)
            .with_status(TransactionStatus::Processing);
        let mut stale: Vec<_> = self
            .store
            .transactions(&filter)
            .into_iter()
            .filter(|tx| tx.created_at <= cutoff)
            .collect();
        stale.sort_by_key(|tx| tx.created_at);
        if !stale.is_empty() {
            tracing::warn!(count = stale.len(), %cutoff, "Stale in-flight ledger rows");
        }
        stale
    }
}
