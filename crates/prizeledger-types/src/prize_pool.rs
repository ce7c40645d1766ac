//! Prize pool configuration and the sponsor pledge ledger.
//!
//! `total_prize_amount` is a ledger of *pledges*. It is not kept in sync
//! with the escrow's funded `locked_amount`; funding is a separate step.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::round_cents;
use crate::{
    Currency, EscrowAccountId, LedgerError, PrizePoolId, Result, SponsorId, TournamentId,
};

// ---------------------------------------------------------------------------
// PositionRange
// ---------------------------------------------------------------------------

/// One finishing position (`"3"`) or an inclusive range (`"5-8"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PositionRange {
    pub first: u32,
    pub last: u32,
}

impl PositionRange {
    #[must_use]
    pub fn single(position: u32) -> Self {
        Self {
            first: position,
            last: position,
        }
    }

    #[must_use]
    pub fn contains(&self, position: u32) -> bool {
        (self.first..=self.last).contains(&position)
    }

    /// Number of finishing positions covered.
    #[must_use]
    pub fn position_count(&self) -> u32 {
        self.last - self.first + 1
    }

    fn overlaps(&self, other: &Self) -> bool {
        self.first <= other.last && other.first <= self.last
    }
}

impl FromStr for PositionRange {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || LedgerError::InvalidDistribution {
            reason: format!("bad position key {s:?}"),
        };
        let parse = |p: &str| p.trim().parse::<u32>().map_err(|_| bad());

        let range = match s.split_once('-') {
            Some((a, b)) => Self {
                first: parse(a)?,
                last: parse(b)?,
            },
            None => Self::single(parse(s)?),
        };
        if range.first == 0 || range.first > range.last {
            return Err(bad());
        }
        Ok(range)
    }
}

impl fmt::Display for PositionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.first == self.last {
            write!(f, "{}", self.first)
        } else {
            write!(f, "{}-{}", self.first, self.last)
        }
    }
}

// ---------------------------------------------------------------------------
// DistributionStructure
// ---------------------------------------------------------------------------

/// A tier of the distribution: each position in `range` receives `share`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistributionTier {
    pub range: PositionRange,
    pub share: Decimal,
}

/// Mapping from position / position range to fractional share of the pool.
///
/// Serialized as a JSON object, e.g. `{"1": "0.40", "5-8": "0.025"}`.
/// Shares need not sum to 1.0; the unawarded remainder stays in escrow.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, Decimal>",
    into = "BTreeMap<String, Decimal>"
)]
pub struct DistributionStructure {
    tiers: Vec<DistributionTier>,
}

impl DistributionStructure {
    /// Build and validate: positions start at 1, ranges don't overlap,
    /// shares lie in `[0, 1]`, and the total allocation is at most 100%.
    pub fn new(tiers: Vec<DistributionTier>) -> Result<Self> {
        let mut tiers = tiers;
        tiers.sort_by_key(|t| t.range);

        for tier in &tiers {
            if tier.share < Decimal::ZERO || tier.share > Decimal::ONE {
                return Err(LedgerError::InvalidDistribution {
                    reason: format!("share {} for {} outside [0, 1]", tier.share, tier.range),
                });
            }
        }
        for pair in tiers.windows(2) {
            if pair[0].range.overlaps(&pair[1].range) {
                return Err(LedgerError::InvalidDistribution {
                    reason: format!("{} overlaps {}", pair[0].range, pair[1].range),
                });
            }
        }
        let structure = Self { tiers };
        let allocated = structure.allocated_fraction();
        if allocated > Decimal::ONE {
            return Err(LedgerError::InvalidDistribution {
                reason: format!("allocates {allocated} of the pool"),
            });
        }
        Ok(structure)
    }

    /// Parse from `("5-8", share)` pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, Decimal)>) -> Result<Self> {
        let tiers = pairs
            .into_iter()
            .map(|(key, share)| {
                Ok(DistributionTier {
                    range: key.parse()?,
                    share,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(tiers)
    }

    /// Share owed to a single finishing position.
    #[must_use]
    pub fn share_for(&self, position: u32) -> Option<Decimal> {
        self.tiers
            .iter()
            .find(|t| t.range.contains(position))
            .map(|t| t.share)
    }

    /// Sum of every configured position's share.
    #[must_use]
    pub fn allocated_fraction(&self) -> Decimal {
        self.tiers
            .iter()
            .map(|t| t.share * Decimal::from(t.range.position_count()))
            .sum()
    }

    #[must_use]
    pub fn tiers(&self) -> &[DistributionTier] {
        &self.tiers
    }
}

impl TryFrom<BTreeMap<String, Decimal>> for DistributionStructure {
    type Error = LedgerError;

    fn try_from(map: BTreeMap<String, Decimal>) -> Result<Self> {
        Self::from_pairs(map.iter().map(|(k, v)| (k.as_str(), *v)))
    }
}

impl From<DistributionStructure> for BTreeMap<String, Decimal> {
    fn from(structure: DistributionStructure) -> Self {
        structure
            .tiers
            .into_iter()
            .map(|t| (t.range.to_string(), t.share))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// PrizePool
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrizePoolStatus {
    Pending,
    Active,
    Distributed,
    Cancelled,
}

impl PrizePoolStatus {
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Active | Self::Cancelled)
                | (Self::Active, Self::Distributed | Self::Cancelled)
        )
    }

    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Active)
    }
}

impl fmt::Display for PrizePoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Distributed => "DISTRIBUTED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// Append-only pledge entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SponsorContribution {
    pub sponsor_id: SponsorId,
    pub company_name: String,
    pub amount: Decimal,
    pub date: DateTime<Utc>,
    pub details: Option<String>,
}

/// Distribution configuration for one tournament.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizePool {
    pub id: PrizePoolId,
    pub tournament_id: TournamentId,
    pub total_prize_amount: Decimal,
    pub currency: Currency,
    pub distribution_structure: DistributionStructure,
    pub sponsor_contributions: Vec<SponsorContribution>,
    pub status: PrizePoolStatus,
    pub escrow_account_id: Option<EscrowAccountId>,
    pub created_at: DateTime<Utc>,
}

impl PrizePool {
    #[must_use]
    pub fn new(
        tournament_id: TournamentId,
        total_prize_amount: Decimal,
        currency: Currency,
        distribution_structure: DistributionStructure,
    ) -> Self {
        Self {
            id: PrizePoolId::new(),
            tournament_id,
            total_prize_amount: round_cents(total_prize_amount),
            currency,
            distribution_structure,
            sponsor_contributions: Vec::new(),
            status: PrizePoolStatus::Pending,
            escrow_account_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn transition(&mut self, target: PrizePoolStatus) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(LedgerError::InvalidPoolTransition {
                id: self.id,
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        Ok(())
    }

    /// Append a pledge and grow the nominal pool by its amount.
    pub fn add_contribution(&mut self, contribution: SponsorContribution) -> Result<()> {
        if !self.status.is_open() {
            return Err(LedgerError::PrizePoolClosed {
                id: self.id,
                status: self.status,
            });
        }
        self.total_prize_amount = round_cents(self.total_prize_amount + contribution.amount);
        self.sponsor_contributions.push(contribution);
        Ok(())
    }

    #[must_use]
    pub fn pledged_by_sponsors(&self) -> Decimal {
        self.sponsor_contributions.iter().map(|c| c.amount).sum()
    }

    /// Contributions are append-only; earlier entries never change.
    pub fn check_update_from(&self, committed: &Self) -> Result<()> {
        let prefix_kept = self.sponsor_contributions.len() >= committed.sponsor_contributions.len()
            && self.sponsor_contributions[..committed.sponsor_contributions.len()]
                == committed.sponsor_contributions[..];
        if !prefix_kept {
            return Err(LedgerError::InvariantViolation {
                reason: format!("prize pool {}: sponsor contributions rewritten", self.id),
            });
        }
        if self.tournament_id != committed.tournament_id {
            return Err(LedgerError::InvariantViolation {
                reason: format!("prize pool {}: tournament changed", self.id),
            });
        }
        if self.status != committed.status && !committed.status.can_transition_to(self.status) {
            return Err(LedgerError::InvalidPoolTransition {
                id: self.id,
                from: committed.status,
                to: self.status,
            });
        }
        Ok(())
    }

    pub fn check_invariants(&self) -> Result<()> {
        if self.total_prize_amount < Decimal::ZERO {
            return Err(LedgerError::InvariantViolation {
                reason: format!("prize pool {}: negative total", self.id),
            });
        }
        Ok(())
    }
}
