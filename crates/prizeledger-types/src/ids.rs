//! Globally unique identifiers used throughout PrizeLedger.
//!
//! All entity IDs use UUIDv7 for time-ordered lexicographic sorting.
//! The escrow *account* identifier is different: it is an opaque,
//! non-guessable string handed to custodial systems, see [`EscrowAccountId`].

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::constants::{ESCROW_ACCOUNT_HEX_LEN, ESCROW_ACCOUNT_PREFIX};

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            #[must_use]
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

uuid_id!(
    /// A platform user: player, winner or sponsor contact.
    UserId,
    "user:"
);
uuid_id!(
    /// The tournament a pool, escrow and entry fee belong to.
    TournamentId,
    "tournament:"
);
uuid_id!(
    /// Distribution configuration row for one tournament.
    PrizePoolId,
    "pool:"
);
uuid_id!(
    /// A verified (or pending verification) payout destination.
    PaymentAccountId,
    "acct:"
);
uuid_id!(
    /// One immutable ledger row.
    TransactionId,
    "tx:"
);
uuid_id!(
    /// Primary key of a [`PrizeEscrow`](crate::PrizeEscrow) row.
    EscrowId,
    "escrow:"
);
uuid_id!(
    /// One (pool, winner) payout obligation.
    PayoutId,
    "payout:"
);
uuid_id!(
    /// A sponsoring organisation.
    SponsorId,
    "sponsor:"
);

// ---------------------------------------------------------------------------
// EscrowAccountId
// ---------------------------------------------------------------------------

/// Opaque custody account reference for a tournament's escrow.
///
/// Derived as `esc_` + the first 32 hex chars of
/// `SHA-256(tournament_id || fresh uuid)`, so two escrows never share an
/// account even for the same tournament across environments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct EscrowAccountId(pub String);

impl EscrowAccountId {
    #[must_use]
    pub fn generate(tournament_id: TournamentId) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"prizeledger:escrow_account:v1:");
        hasher.update(tournament_id.0.as_bytes());
        hasher.update(Uuid::now_v7().as_bytes());
        let digest = hex::encode(hasher.finalize());
        Self(format!(
            "{ESCROW_ACCOUNT_PREFIX}{}",
            &digest[..ESCROW_ACCOUNT_HEX_LEN]
        ))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EscrowAccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
