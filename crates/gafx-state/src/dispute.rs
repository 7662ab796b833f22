//! # Dispute Sub-Status
//!
//! A dispute moves `OPEN → INVESTIGATING → RESOLVED`. `INVESTIGATING` is
//! entered by an admin's request for more information and does not change
//! the order's state. `RESOLVED` is only ever reached together with one of
//! the two resolved order states.

use serde::{Deserialize, Serialize};

/// Status of a dispute record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeStatus {
    Open,
    Investigating,
    /// Terminal.
    Resolved,
}

impl DisputeStatus {
    pub const ALL: [DisputeStatus; 3] = [Self::Open, Self::Investigating, Self::Resolved];

    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Resolved)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Investigating => "INVESTIGATING",
            Self::Resolved => "RESOLVED",
        }
    }
}

impl std::fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DisputeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown dispute status: {s}"))
    }
}

/// Outcome recorded on a resolved dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resolution {
    BuyerFavor,
    SellerFavor,
    /// Reserved for split awards; no transition produces it today.
    Split,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BuyerFavor => "BUYER_FAVOR",
            Self::SellerFavor => "SELLER_FAVOR",
            Self::Split => "SPLIT",
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
